//! Single-pass compiler: recursive descent over the token stream, emitting
//! TAC lines directly with temp allocation and jump backpatching. There is
//! no AST; expression parsers return the operand (a literal, temp, variable,
//! or member reference) that later lines should consume.

use std::rc::Rc;

use miniscript_core::{intern, FuncDef, Line, MsError, Op, Param, Value, VarMap};

use crate::lexer::{tokenize, Keyword, SpannedToken, Token};

/// Compile a complete source text into the main function's TAC.
pub fn compile(source: &str) -> Result<Rc<FuncDef>, MsError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let end = parser.parse_block(&[])?;
    debug_assert!(matches!(end, BlockEnd::Eof));
    let compiler = parser.compilers.pop().expect("root compiler");
    Ok(Rc::new(FuncDef {
        params: Vec::new(),
        code: compiler.code,
    }))
}

/// Would this (possibly partial) source compile further if more lines were
/// appended? True while block openers or brackets are unclosed — the REPL's
/// continuation test.
pub fn needs_more_input(source: &str) -> bool {
    let tokens = match tokenize(source) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let mut depth: i64 = 0;
    let mut brackets: i64 = 0;
    for (i, spanned) in tokens.iter().enumerate() {
        match &spanned.token {
            Token::Keyword(Keyword::While | Keyword::For | Keyword::Function) => depth += 1,
            Token::Keyword(Keyword::If) => {
                // Only the block form (`then` at end of line) opens a block.
                let mut j = i + 1;
                while j < tokens.len() && tokens[j].token != Token::Keyword(Keyword::Then) {
                    j += 1;
                }
                if j < tokens.len() {
                    match tokens.get(j + 1).map(|t| &t.token) {
                        None | Some(Token::Eol) => depth += 1,
                        _ => {}
                    }
                } else {
                    // `if` with no `then` yet; assume the line is still coming.
                    depth += 1;
                }
            }
            Token::Keyword(Keyword::End) => depth -= 1,
            Token::LParen | Token::LBracket | Token::LBrace => brackets += 1,
            Token::RParen | Token::RBracket | Token::RBrace => brackets -= 1,
            _ => {}
        }
    }
    depth > 0 || brackets > 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    Eof,
    Else,
    EndIf,
    EndWhile,
    EndFor,
    EndFunction,
}

struct LoopFrame {
    continue_target: usize,
    break_patches: Vec<usize>,
}

struct FuncCompiler {
    code: Vec<Line>,
    next_temp: u16,
    loops: Vec<LoopFrame>,
}

impl FuncCompiler {
    fn new() -> Self {
        FuncCompiler {
            code: Vec::new(),
            next_temp: 0,
            loops: Vec::new(),
        }
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    compilers: Vec<FuncCompiler>,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens,
            pos: 0,
            compilers: vec![FuncCompiler::new()],
        }
    }

    // ── Token helpers ─────────────────────────────────────────────

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|t| t.token.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        self.eat(&Token::Keyword(kw))
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), MsError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), MsError> {
        self.expect(&Token::Keyword(kw), &format!("'{}'", kw.name()))
    }

    fn skip_eols(&mut self) {
        while self.eat(&Token::Eol) {}
    }

    fn error(&self, msg: impl Into<String>) -> MsError {
        let msg = msg.into();
        match self.peek() {
            Some(tok) => {
                MsError::compiler(format!("{msg} (found {tok:?} on line {})", self.line()))
            }
            None => MsError::compiler(format!("{msg} (at end of input)")),
        }
    }

    // ── Emission helpers ──────────────────────────────────────────

    fn fc(&mut self) -> &mut FuncCompiler {
        self.compilers.last_mut().expect("compiler stack nonempty")
    }

    fn here(&self) -> usize {
        self.compilers.last().expect("compiler stack nonempty").code.len()
    }

    fn emit(&mut self, line: Line) -> usize {
        let fc = self.fc();
        fc.code.push(line);
        fc.code.len() - 1
    }

    fn emit_at(&mut self, lhs: Value, op: Op, a: Value, b: Value) -> usize {
        let loc = self.line();
        self.emit(Line::new(lhs, op, a, b).at(loc))
    }

    fn new_temp(&mut self) -> Result<u16, MsError> {
        let fc = self.fc();
        if fc.next_temp == u16::MAX {
            return Err(MsError::compiler("expression too complex (out of temporaries)"));
        }
        let t = fc.next_temp;
        fc.next_temp += 1;
        Ok(t)
    }

    /// Emit a jump whose target is patched later.
    fn emit_jump(&mut self, op: Op, condition: Value) -> usize {
        self.emit_at(Value::Null, op, Value::Null, condition)
    }

    fn patch(&mut self, index: usize, target: usize) {
        self.fc().code[index].a = Value::Number(target as f64);
    }

    fn patch_here(&mut self, index: usize) {
        let target = self.here();
        self.patch(index, target);
    }

    // ── Blocks and statements ─────────────────────────────────────

    /// Parse statements until one of `terminators` closes the block. The
    /// terminator token(s) are consumed.
    fn parse_block(&mut self, terminators: &[BlockEnd]) -> Result<BlockEnd, MsError> {
        loop {
            self.skip_eols();
            match self.peek() {
                None => {
                    if terminators.is_empty() {
                        return Ok(BlockEnd::Eof);
                    }
                    return Err(MsError::compiler(format!(
                        "unexpected end of input; expected {}",
                        describe_terminators(terminators)
                    )));
                }
                Some(Token::Keyword(Keyword::Else)) if terminators.contains(&BlockEnd::Else) => {
                    self.pos += 1;
                    return Ok(BlockEnd::Else);
                }
                Some(Token::Keyword(Keyword::End)) => {
                    self.pos += 1;
                    let end = match self.advance() {
                        Some(Token::Keyword(Keyword::If)) => BlockEnd::EndIf,
                        Some(Token::Keyword(Keyword::While)) => BlockEnd::EndWhile,
                        Some(Token::Keyword(Keyword::For)) => BlockEnd::EndFor,
                        Some(Token::Keyword(Keyword::Function)) => BlockEnd::EndFunction,
                        _ => {
                            return Err(self.error(
                                "expected 'if', 'while', 'for', or 'function' after 'end'",
                            ))
                        }
                    };
                    if terminators.contains(&end) {
                        return Ok(end);
                    }
                    return Err(MsError::compiler(format!(
                        "'end {}' without a matching opener (line {})",
                        end_keyword(end),
                        self.line()
                    )));
                }
                _ => self.parse_statement(false)?,
            }
        }
    }

    fn parse_statement(&mut self, inline_if_arm: bool) -> Result<(), MsError> {
        match self.peek() {
            Some(Token::Keyword(Keyword::If)) => {
                self.pos += 1;
                self.parse_if()
            }
            Some(Token::Keyword(Keyword::While)) => {
                self.pos += 1;
                self.parse_while()
            }
            Some(Token::Keyword(Keyword::For)) => {
                self.pos += 1;
                self.parse_for()
            }
            Some(Token::Keyword(Keyword::Return)) => {
                self.pos += 1;
                let operand = match self.peek() {
                    None | Some(Token::Eol) | Some(Token::Keyword(Keyword::Else)) => Value::Null,
                    _ => self.parse_expr()?,
                };
                self.emit_at(Value::Null, Op::Return, operand, Value::Null);
                self.expect_statement_end(inline_if_arm)
            }
            Some(Token::Keyword(Keyword::Break)) => {
                self.pos += 1;
                let jump = self.emit_jump(Op::Jump, Value::Null);
                match self.fc().loops.last_mut() {
                    Some(frame) => frame.break_patches.push(jump),
                    None => return Err(self.error("'break' outside of a loop")),
                }
                self.expect_statement_end(inline_if_arm)
            }
            Some(Token::Keyword(Keyword::Continue)) => {
                self.pos += 1;
                let target = match self.fc().loops.last() {
                    Some(frame) => frame.continue_target,
                    None => return Err(self.error("'continue' outside of a loop")),
                };
                self.emit_at(
                    Value::Null,
                    Op::Jump,
                    Value::Number(target as f64),
                    Value::Null,
                );
                self.expect_statement_end(inline_if_arm)
            }
            _ => self.parse_expression_statement(inline_if_arm),
        }
    }

    fn parse_expression_statement(&mut self, inline_if_arm: bool) -> Result<(), MsError> {
        let target = self.parse_expr()?;
        match self.peek() {
            Some(Token::Assign) => {
                self.pos += 1;
                let rhs = self.parse_expr()?;
                self.check_assign_target(&target)?;
                self.emit_at(target, Op::Assign, rhs, Value::Null);
            }
            Some(
                Token::PlusAssign
                | Token::MinusAssign
                | Token::StarAssign
                | Token::SlashAssign
                | Token::PercentAssign
                | Token::CaretAssign,
            ) => {
                let op = match self.advance().expect("peeked") {
                    Token::PlusAssign => Op::Add,
                    Token::MinusAssign => Op::Sub,
                    Token::StarAssign => Op::Mul,
                    Token::SlashAssign => Op::Div,
                    Token::PercentAssign => Op::Mod,
                    Token::CaretAssign => Op::Pow,
                    _ => unreachable!(),
                };
                let rhs = self.parse_expr()?;
                self.check_assign_target(&target)?;
                let t = self.new_temp()?;
                self.emit_at(Value::Temp(t), op, target.clone(), rhs);
                self.emit_at(target, Op::Assign, Value::Temp(t), Value::Null);
            }
            _ => {
                self.emit_at(Value::Null, Op::AssignImplicit, target, Value::Null);
            }
        }
        self.expect_statement_end(inline_if_arm)
    }

    fn check_assign_target(&self, target: &Value) -> Result<(), MsError> {
        match target {
            Value::Var(_) | Value::SeqElem(_) => Ok(()),
            _ => Err(MsError::compiler(format!(
                "can't assign to this expression (line {})",
                self.line()
            ))),
        }
    }

    fn expect_statement_end(&mut self, inline_if_arm: bool) -> Result<(), MsError> {
        match self.peek() {
            None | Some(Token::Eol) => {
                self.eat(&Token::Eol);
                Ok(())
            }
            Some(Token::Keyword(Keyword::Else)) if inline_if_arm => Ok(()),
            _ => Err(self.error("expected end of statement")),
        }
    }

    // ── Control flow ──────────────────────────────────────────────

    fn parse_if(&mut self) -> Result<(), MsError> {
        let mut end_patches: Vec<usize> = Vec::new();
        loop {
            let cond = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            match self.peek() {
                // Block form: `then` ends the line.
                None | Some(Token::Eol) => {
                    self.eat(&Token::Eol);
                    let false_jump = self.emit_jump(Op::JumpIfFalse, cond);
                    match self.parse_block(&[BlockEnd::Else, BlockEnd::EndIf])? {
                        BlockEnd::EndIf => {
                            self.patch_here(false_jump);
                            break;
                        }
                        BlockEnd::Else => {
                            let skip = self.emit_jump(Op::Jump, Value::Null);
                            end_patches.push(skip);
                            self.patch_here(false_jump);
                            if self.eat_keyword(Keyword::If) {
                                // `else if`: loop around for the next arm.
                                continue;
                            }
                            self.parse_block(&[BlockEnd::EndIf])?;
                            break;
                        }
                        _ => unreachable!("terminator set"),
                    }
                }
                // Single-line form: `if c then stmt [else stmt]`.
                _ => {
                    let false_jump = self.emit_jump(Op::JumpIfFalse, cond);
                    self.parse_statement(true)?;
                    if self.eat_keyword(Keyword::Else) {
                        let skip = self.emit_jump(Op::Jump, Value::Null);
                        self.patch_here(false_jump);
                        self.parse_statement(true)?;
                        self.patch_here(skip);
                    } else {
                        self.patch_here(false_jump);
                    }
                    break;
                }
            }
        }
        for patch in end_patches {
            self.patch_here(patch);
        }
        Ok(())
    }

    fn parse_while(&mut self) -> Result<(), MsError> {
        let top = self.here();
        let cond = self.parse_expr()?;
        let exit = self.emit_jump(Op::JumpIfFalse, cond);
        self.fc().loops.push(LoopFrame {
            continue_target: top,
            break_patches: Vec::new(),
        });
        self.expect_statement_end(false)?;
        self.parse_block(&[BlockEnd::EndWhile])?;
        self.emit_at(
            Value::Null,
            Op::Jump,
            Value::Number(top as f64),
            Value::Null,
        );
        self.patch_here(exit);
        let frame = self.fc().loops.pop().expect("loop frame pushed above");
        for patch in frame.break_patches {
            self.patch_here(patch);
        }
        Ok(())
    }

    fn parse_for(&mut self) -> Result<(), MsError> {
        let var = match self.advance() {
            Some(Token::Identifier(name)) => intern(&name),
            _ => return Err(self.error("expected a loop variable after 'for'")),
        };
        self.expect_keyword(Keyword::In)?;
        let seq = self.parse_expr()?;

        let t_seq = self.new_temp()?;
        self.emit_at(Value::Temp(t_seq), Op::Assign, seq, Value::Null);
        let t_idx = self.new_temp()?;
        self.emit_at(
            Value::Temp(t_idx),
            Op::Assign,
            Value::Number(-1.0),
            Value::Null,
        );

        let top = self.here();
        self.emit_at(
            Value::Temp(t_idx),
            Op::Add,
            Value::Temp(t_idx),
            Value::Number(1.0),
        );
        let t_len = self.new_temp()?;
        self.emit_at(Value::Temp(t_len), Op::Length, Value::Temp(t_seq), Value::Null);
        let t_done = self.new_temp()?;
        self.emit_at(
            Value::Temp(t_done),
            Op::GreaterEq,
            Value::Temp(t_idx),
            Value::Temp(t_len),
        );
        let exit = self.emit_jump(Op::JumpIfTrue, Value::Temp(t_done));
        self.emit_at(
            Value::var(var),
            Op::IndexIter,
            Value::Temp(t_seq),
            Value::Temp(t_idx),
        );

        self.fc().loops.push(LoopFrame {
            continue_target: top,
            break_patches: Vec::new(),
        });
        self.expect_statement_end(false)?;
        self.parse_block(&[BlockEnd::EndFor])?;
        self.emit_at(
            Value::Null,
            Op::Jump,
            Value::Number(top as f64),
            Value::Null,
        );
        self.patch_here(exit);
        let frame = self.fc().loops.pop().expect("loop frame pushed above");
        for patch in frame.break_patches {
            self.patch_here(patch);
        }
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Value, MsError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Value, MsError> {
        let mut operand = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            // Short-circuit: a truly-true left side skips the right side
            // entirely and reifies to 1; otherwise the fuzzy OR runs.
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Assign, operand, Value::Null);
            let short = self.emit_jump(Op::JumpIfTruly, Value::Temp(t));
            let rhs = self.parse_and()?;
            self.emit_at(Value::Temp(t), Op::Or, Value::Temp(t), rhs);
            let done = self.emit_jump(Op::Jump, Value::Null);
            self.patch_here(short);
            self.emit_at(Value::Temp(t), Op::Assign, Value::Number(1.0), Value::Null);
            self.patch_here(done);
            operand = Value::Temp(t);
        }
        Ok(operand)
    }

    fn parse_and(&mut self) -> Result<Value, MsError> {
        let mut operand = self.parse_not()?;
        while self.eat_keyword(Keyword::And) {
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Assign, operand, Value::Null);
            let short = self.emit_jump(Op::JumpIfFalse, Value::Temp(t));
            let rhs = self.parse_not()?;
            self.emit_at(Value::Temp(t), Op::And, Value::Temp(t), rhs);
            let done = self.emit_jump(Op::Jump, Value::Null);
            self.patch_here(short);
            self.emit_at(Value::Temp(t), Op::Assign, Value::Number(0.0), Value::Null);
            self.patch_here(done);
            operand = Value::Temp(t);
        }
        Ok(operand)
    }

    fn parse_not(&mut self) -> Result<Value, MsError> {
        if self.eat_keyword(Keyword::Not) {
            let operand = self.parse_not()?;
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Not, operand, Value::Null);
            return Ok(Value::Temp(t));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Value, MsError> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Eq) => Op::Equal,
            Some(Token::Ne) => Op::NotEqual,
            Some(Token::Lt) => Op::Less,
            Some(Token::Le) => Op::LessEq,
            Some(Token::Gt) => Op::Greater,
            Some(Token::Ge) => Op::GreaterEq,
            Some(Token::Keyword(Keyword::Isa)) => Op::Isa,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        let t = self.new_temp()?;
        self.emit_at(Value::Temp(t), op, lhs, rhs);
        Ok(Value::Temp(t))
    }

    fn parse_sum(&mut self) -> Result<Value, MsError> {
        let mut operand = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(operand),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), op, operand, rhs);
            operand = Value::Temp(t);
        }
    }

    fn parse_term(&mut self) -> Result<Value, MsError> {
        let mut operand = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                Some(Token::Percent) => Op::Mod,
                _ => return Ok(operand),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), op, operand, rhs);
            operand = Value::Temp(t);
        }
    }

    fn parse_unary(&mut self) -> Result<Value, MsError> {
        if self.eat(&Token::Minus) {
            let operand = self.parse_unary()?;
            if let Value::Number(n) = operand {
                return Ok(Value::Number(-n));
            }
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Sub, Value::Number(0.0), operand);
            return Ok(Value::Temp(t));
        }
        if self.eat_keyword(Keyword::New) {
            // `new X` is a fresh map whose `__isa` is X.
            let parent = self.parse_unary()?;
            let mut literal = VarMap::new();
            literal.insert(Value::string("__isa"), parent);
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Copy, Value::map(literal), Value::Null);
            return Ok(Value::Temp(t));
        }
        if self.eat(&Token::At) {
            let operand = self.parse_postfix()?;
            return match operand {
                Value::Var(v) => Ok(Value::var_no_invoke(v.name)),
                Value::SeqElem(e) => Ok(Value::seq_elem(
                    e.seq.clone(),
                    e.index.clone(),
                    true,
                )),
                _ => Err(self.error("'@' requires an identifier or member access")),
            };
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Value, MsError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::Caret) {
            // Right-associative, and the exponent may carry a unary minus.
            let exponent = self.parse_unary()?;
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::Pow, base, exponent);
            return Ok(Value::Temp(t));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Value, MsError> {
        let mut operand = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.advance() {
                        Some(Token::Identifier(name)) => name,
                        _ => return Err(self.error("expected a member name after '.'")),
                    };
                    operand = Value::seq_elem(operand, Value::string(&name), false);
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    operand = Value::seq_elem(operand, index, false);
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&Token::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')'")?;
                    let argc = args.len();
                    for arg in args {
                        self.emit_at(Value::Null, Op::PushArg, arg, Value::Null);
                    }
                    let t = self.new_temp()?;
                    self.emit_at(
                        Value::Temp(t),
                        Op::CallFunction,
                        operand,
                        Value::Number(argc as f64),
                    );
                    operand = Value::Temp(t);
                }
                _ => return Ok(operand),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Value, MsError> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Value::Number(n))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Value::string(&s))
            }
            Some(Token::Keyword(Keyword::True)) => {
                self.pos += 1;
                Ok(Value::ONE)
            }
            Some(Token::Keyword(Keyword::False)) => {
                self.pos += 1;
                Ok(Value::ZERO)
            }
            Some(Token::Keyword(Keyword::Null)) => {
                self.pos += 1;
                Ok(Value::Null)
            }
            Some(Token::Identifier(name)) => {
                self.pos += 1;
                Ok(Value::var(intern(&name)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let operand = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(operand)
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                let t = self.new_temp()?;
                self.emit_at(Value::Temp(t), Op::Copy, Value::list(items), Value::Null);
                Ok(Value::Temp(t))
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let mut literal = VarMap::new();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = self.parse_expr()?;
                        self.expect(&Token::Colon, "':'")?;
                        let value = self.parse_expr()?;
                        literal.insert(key, value);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace, "'}'")?;
                let t = self.new_temp()?;
                self.emit_at(Value::Temp(t), Op::Copy, Value::map(literal), Value::Null);
                Ok(Value::Temp(t))
            }
            Some(Token::Keyword(Keyword::Function)) => {
                self.pos += 1;
                self.parse_function_literal()
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    fn parse_function_literal(&mut self) -> Result<Value, MsError> {
        let mut params = Vec::new();
        if self.eat(&Token::LParen) {
            if self.peek() != Some(&Token::RParen) {
                loop {
                    let name = match self.advance() {
                        Some(Token::Identifier(name)) => intern(&name),
                        _ => return Err(self.error("expected a parameter name")),
                    };
                    let default = if self.eat(&Token::Assign) {
                        self.parse_param_default()?
                    } else {
                        Value::Null
                    };
                    params.push(Param { name, default });
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RParen, "')'")?;
        }
        self.compilers.push(FuncCompiler::new());
        let body = (|| {
            self.skip_eols();
            self.parse_block(&[BlockEnd::EndFunction])
        })();
        let compiler = self.compilers.pop().expect("function compiler");
        body?;
        let def = Rc::new(FuncDef {
            params,
            code: compiler.code,
        });
        let literal = Value::function(def);
        if self.compilers.len() > 1 {
            // Nested function: capture the enclosing call's variables.
            let t = self.new_temp()?;
            self.emit_at(Value::Temp(t), Op::BindOuter, literal, Value::Null);
            Ok(Value::Temp(t))
        } else {
            Ok(literal)
        }
    }

    /// Parameter defaults are constants, not expressions.
    fn parse_param_default(&mut self) -> Result<Value, MsError> {
        let negative = self.eat(&Token::Minus);
        match self.advance() {
            Some(Token::Number(n)) => Ok(Value::Number(if negative { -n } else { n })),
            Some(Token::Str(s)) if !negative => Ok(Value::string(&s)),
            Some(Token::Keyword(Keyword::True)) if !negative => Ok(Value::ONE),
            Some(Token::Keyword(Keyword::False)) if !negative => Ok(Value::ZERO),
            Some(Token::Keyword(Keyword::Null)) if !negative => Ok(Value::Null),
            _ => Err(self.error("expected a constant default value")),
        }
    }
}

fn end_keyword(end: BlockEnd) -> &'static str {
    match end {
        BlockEnd::EndIf => "if",
        BlockEnd::EndWhile => "while",
        BlockEnd::EndFor => "for",
        BlockEnd::EndFunction => "function",
        BlockEnd::Else => "else",
        BlockEnd::Eof => "",
    }
}

fn describe_terminators(terminators: &[BlockEnd]) -> String {
    let parts: Vec<String> = terminators
        .iter()
        .filter(|t| !matches!(t, BlockEnd::Eof | BlockEnd::Else))
        .map(|t| format!("'end {}'", end_keyword(*t)))
        .collect();
    if parts.is_empty() {
        "end of block".to_string()
    } else {
        parts.join(" or ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_of(src: &str) -> Vec<Op> {
        compile(src).unwrap().code.iter().map(|l| l.op).collect()
    }

    #[test]
    fn assignment_compiles_to_tac() {
        let func = compile("x = 2 + 3 * 4").unwrap();
        let ops: Vec<Op> = func.code.iter().map(|l| l.op).collect();
        assert_eq!(ops, vec![Op::Mul, Op::Add, Op::Assign]);
        assert_eq!(func.code[2].lhs.to_display_string(), "x");
    }

    #[test]
    fn expression_statement_is_implicit_assign() {
        let ops = ops_of("2 + 2");
        assert_eq!(ops, vec![Op::Add, Op::AssignImplicit]);
    }

    #[test]
    fn source_lines_are_recorded() {
        let func = compile("x = 1\ny = 2").unwrap();
        assert_eq!(func.code[0].location, 1);
        assert_eq!(func.code[1].location, 2);
    }

    #[test]
    fn if_blocks_jump_over_their_bodies() {
        let func = compile("if x then\ny = 1\nend if").unwrap();
        assert_eq!(func.code[0].op, Op::JumpIfFalse);
        assert_eq!(func.code[0].a.as_number(), Some(2.0));
    }

    #[test]
    fn while_loops_jump_back_to_the_condition() {
        let func = compile("while x\nx = x - 1\nend while").unwrap();
        let last = func.code.last().unwrap();
        assert_eq!(last.op, Op::Jump);
        assert_eq!(last.a.as_number(), Some(0.0));
    }

    #[test]
    fn or_emits_short_circuit_shape() {
        let ops = ops_of("z = x or y");
        assert_eq!(
            ops,
            vec![
                Op::Assign,
                Op::JumpIfTruly,
                Op::Or,
                Op::Jump,
                Op::Assign,
                Op::Assign,
            ]
        );
    }

    #[test]
    fn call_pushes_args_before_calling() {
        let ops = ops_of("f(1, 2)");
        assert_eq!(
            ops,
            vec![Op::PushArg, Op::PushArg, Op::CallFunction, Op::AssignImplicit]
        );
    }

    #[test]
    fn member_and_index_targets_are_assignable() {
        assert!(compile("m.x = 1").is_ok());
        assert!(compile("l[0] = 1").is_ok());
        assert!(compile("3 = 1").is_err());
    }

    #[test]
    fn break_requires_a_loop() {
        assert!(compile("break").is_err());
        assert!(compile("while 1\nbreak\nend while").is_ok());
    }

    #[test]
    fn mismatched_end_is_rejected() {
        assert!(compile("if x then\nend while").is_err());
        assert!(compile("end if").is_err());
    }

    #[test]
    fn partial_blocks_ask_for_more_input() {
        assert!(needs_more_input("if x then"));
        assert!(needs_more_input("while x"));
        assert!(needs_more_input("f = function(a)"));
        assert!(needs_more_input("l = [1, 2,"));
        assert!(!needs_more_input("if x then y = 1"));
        assert!(!needs_more_input("x = 1"));
        assert!(!needs_more_input("if x then\ny = 1\nend if"));
    }

    #[test]
    fn nested_functions_bind_their_outer_context() {
        let func = compile("f = function\ng = function\nreturn 1\nend function\nend function")
            .unwrap();
        // Outer literal at top level: no BindOuter in main...
        assert!(func.code.iter().all(|l| l.op != Op::BindOuter));
        // ...but the inner literal (compiled into f's body) gets one.
        let outer = func
            .code
            .iter()
            .find_map(|l| match &l.a {
                Value::Function(f) => Some(f.def.clone()),
                _ => None,
            })
            .expect("outer function literal");
        assert!(outer.code.iter().any(|l| l.op == Op::BindOuter));
    }
}
