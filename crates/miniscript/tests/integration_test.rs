//! End-to-end tests: source text through the reader, machine, and stdlib.

mod common;

// ── Core scenario table ───────────────────────────────────────────

scenario_tests! {
    arithmetic_precedence: "x = 2 + 3 * 4\nx" => "14",
    map_member_sum: "m = {\"a\":1, \"b\":2}\nm.a + m.b" => "3",
    string_replication: "s = \"ab\"\ns * 3" => "ababab",
    string_fractional_replication: "s = \"ab\"\ns * 0.5" => "a",
    list_concat: "l = [1,2,3]\nl + [4]" => "[1, 2, 3, 4]",
    list_concat_leaves_original: "l = [1,2,3]\nx = l + [4]\nl" => "[1, 2, 3]",
    prototype_method: "Animal = {\"speak\": function(); return \"?\"; end function}\nDog = {\"__isa\": Animal}\nDog.speak" => "?",
    fuzzy_or_keeps_partial_truth: "0 or 0.3" => "0.3",
    fuzzy_and_is_product: "0.5 and 0.5" => "0.25",
    fuzzy_or_is_probabilistic_sum: "0.5 or 0.5" => "0.75",
    fuzzy_not: "not 0.3" => "0.7",
    fuzzy_branch_is_truthy: "if 0.3 then\nx = \"yes\"\nelse\nx = \"no\"\nend if\nx" => "yes",
    division: "10 / 4" => "2.5",
    modulo: "7 % 3" => "1",
    power_is_right_associative: "2 ^ 3 ^ 2" => "512",
    unary_minus_binds_looser_than_power: "-2 ^ 2" => "-4",
    comparison_chain: "3 > 2" => "1",
    string_ordinal_compare: "\"a\" < \"b\"" => "1",
    mixed_compare_is_false: "\"3\" > 2" => "0",
    equality_is_deep: "[1, [2, 3]] == [1, [2, 3]]" => "1",
    null_equality: "null == null" => "1",
    null_vs_value: "1 == null" => "0",
    string_minus_suffix: "\"hello.txt\" - \".txt\"" => "hello",
    string_index: "\"hello\"[1]" => "e",
    string_negative_index: "\"hello\"[-1]" => "o",
    list_negative_index: "[10, 20, 30][-1]" => "30",
    map_plus_merges_right_wins: "a = {\"x\": 1, \"y\": 1}\nb = {\"y\": 2}\nc = a + b\nc.y" => "2",
    isa_number: "3 isa number" => "1",
    isa_string: "\"s\" isa string" => "1",
    isa_list: "[] isa list" => "1",
    isa_map: "{} isa map" => "1",
    isa_chain: "Animal = {}\nDog = new Animal\nd = new Dog\nd isa Animal" => "1",
    isa_mismatch: "3 isa string" => "0",
    null_isa_null: "null isa null" => "1",
    number_display_integral: "14.0" => "14",
    number_display_fraction: "0.1 + 0.2 == 0.3" => "0",
    true_is_one: "true" => "1",
    boolean_not: "not []" => "1",
}

// ── Control flow ──────────────────────────────────────────────────

scenario_tests! {
    while_loop: "i = 0\ntotal = 0\nwhile i < 5\ni = i + 1\ntotal = total + i\nend while\ntotal" => "15",
    while_break_and_continue: "i = 0\ntotal = 0\nwhile true\ni = i + 1\nif i > 10 then break\nif i % 2 == 0 then continue\ntotal = total + i\nend while\ntotal" => "25",
    for_over_range: "total = 0\nfor i in range(1, 5)\ntotal = total + i\nend for\ntotal" => "15",
    for_over_list: "parts = \"\"\nfor p in [\"a\", \"b\"]\nparts = parts + p\nend for\nparts" => "ab",
    for_over_map_yields_key_value: "m = {\"a\": 1}\nout = \"\"\nfor kv in m\nout = kv.key + \"=\" + kv.value\nend for\nout" => "a=1",
    for_preserves_insertion_order: "m = {}\nm.z = 1\nm.a = 2\nkeys = \"\"\nfor kv in m\nkeys = keys + kv.key\nend for\nkeys" => "za",
    else_if_arms: "x = 2\nif x == 1 then\ny = \"one\"\nelse if x == 2 then\ny = \"two\"\nelse\ny = \"many\"\nend if\ny" => "two",
    single_line_if_else: "x = 5\nif x > 3 then y = \"big\" else y = \"small\"\ny" => "big",
    short_circuit_or_skips_rhs: "1 or undefinedThing" => "1",
    short_circuit_and_skips_rhs: "0 and undefinedThing" => "0",
    compound_assignment: "x = 10\nx += 5\nx *= 2\nx" => "30",
}

// ── Functions and closures ────────────────────────────────────────

scenario_tests! {
    function_call_with_args: "add = function(a, b)\nreturn a + b\nend function\nadd(2, 3)" => "5",
    default_parameter: "greet = function(name=\"world\")\nreturn \"hello \" + name\nend function\ngreet" => "hello world",
    default_overridden: "greet = function(name=\"world\")\nreturn \"hello \" + name\nend function\ngreet(\"there\")" => "hello there",
    recursion: "fact = function(n)\nif n <= 1 then return 1\nreturn n * fact(n - 1)\nend function\nfact(10)" => "3628800",
    closure_captures_outer: "makeAdder = function(n)\nreturn function(x)\nreturn x + n\nend function\nend function\nadd5 = makeAdder(5)\nadd5(3)" => "8",
    bare_function_statement_invokes: "f = function\nreturn 7\nend function\nf" => "7",
    at_suppresses_invocation: "f = function\nreturn 7\nend function\ng = @f\ng" => "7",
    self_in_method: "m = {\"name\": \"thing\"}\nm.describe = function()\nreturn \"a \" + self.name\nend function\nm.describe" => "a thing",
    super_dispatch: "Animal = {}\nAnimal.kind = function()\nreturn \"animal\"\nend function\nDog = new Animal\nDog.kind = function()\nreturn \"dog (an \" + super.kind() + \")\"\nend function\nDog.kind" => "dog (an animal)",
    method_via_isa_binds_self: "Animal = {\"name\": \"?\"}\nAnimal.getName = function()\nreturn self.name\nend function\nrex = new Animal\nrex.name = \"Rex\"\nrex.getName" => "Rex",
    function_display: "f = function(a, b=2)\nreturn a\nend function\n@f" => "FUNCTION(a, b=2)",
}

// ── Intrinsics ────────────────────────────────────────────────────

scenario_tests! {
    len_of_string: "len(\"héllo\")" => "5",
    len_of_list: "[1, 2, 3].len" => "3",
    str_of_number: "str(3.5)" => "3.5",
    val_of_string: "val(\"3.5\") * 2" => "7",
    range_down_to_zero: "range(3)" => "[3, 2, 1, 0]",
    range_with_step: "range(0, 10, 5)" => "[0, 5, 10]",
    abs_value: "abs(-3)" => "3",
    floor_value: "floor(2.7)" => "2",
    sqrt_value: "sqrt(16)" => "4",
    round_with_places: "round(3.14159, 2)" => "3.14",
    sign_value: "sign(-42)" => "-1",
    list_push_returns_self: "[3, 1].push(2)" => "[3, 1, 2]",
    list_pop: "l = [1, 2, 3]\nx = l.pop\nl" => "[1, 2]",
    list_pull: "l = [1, 2, 3]\nl.pull" => "1",
    list_sum: "[1, 2, 3].sum" => "6",
    list_insert: "[1, 3].insert(1, 2)" => "[1, 2, 3]",
    list_remove: "l = [1, 2, 3]\nl.remove(0)\nl" => "[2, 3]",
    list_index_of: "[\"a\", \"b\", \"c\"].indexOf(\"b\")" => "1",
    list_index_of_missing_is_null: "x = [1].indexOf(9)\nx == null" => "1",
    list_join: "[1, 2, 3].join(\"-\")" => "1-2-3",
    list_has_index: "[1, 2].hasIndex(1)" => "1",
    map_has_index: "{\"a\": 1}.hasIndex(\"a\")" => "1",
    map_remove: "m = {\"a\": 1, \"b\": 2}\nm.remove(\"a\")\nm" => "{\"b\": 2}",
    map_indexes: "{\"a\": 1, \"b\": 2}.indexes" => "[\"a\", \"b\"]",
    map_values: "{\"a\": 1, \"b\": 2}.values" => "[1, 2]",
    string_upper: "\"miniscript\".upper" => "MINISCRIPT",
    string_split: "\"a,b,c\".split(\",\")" => "[\"a\", \"b\", \"c\"]",
    string_replace: "\"aaa\".replace(\"a\", \"b\")" => "bbb",
    string_index_of: "\"hello\".indexOf(\"llo\")" => "2",
    string_has_index: "\"abc\".hasIndex(5)" => "0",
    map_sum: "{\"a\": 1, \"b\": 2}.sum" => "3",
}

// ── print and sinks ───────────────────────────────────────────────

#[test]
fn print_goes_to_standard_output() {
    let lines = common::printed("print(\"hello\")\nprint(2 + 2)");
    assert_eq!(lines, vec!["hello", "4"]);
}

#[test]
fn implicit_echo_skips_nulls() {
    let capture = common::run("print(\"x\")\n42");
    assert_eq!(capture.implicit, vec!["42"]);
}

// ── Errors ────────────────────────────────────────────────────────

#[test]
fn undefined_identifier_reports_and_stops() {
    let err = common::first_error("x = missingThing");
    assert!(err.contains("Undefined Identifier"), "got: {err}");
    assert!(err.contains("missingThing"), "got: {err}");
}

#[test]
fn errors_carry_source_lines() {
    let err = common::first_error("y = 1\nx = missingThing");
    assert!(err.contains("[line 2]"), "got: {err}");
}

#[test]
fn missing_map_key_is_a_key_error() {
    let err = common::first_error("m = {}\nm.missing");
    assert!(err.contains("Key Not Found"), "got: {err}");
}

#[test]
fn out_of_range_index_is_an_index_error() {
    let err = common::first_error("[1, 2][5]");
    assert!(err.contains("Index Error"), "got: {err}");
}

#[test]
fn type_mismatch_is_a_type_error() {
    let err = common::first_error("[1] + 1");
    assert!(err.contains("Type Error"), "got: {err}");
}

#[test]
fn isa_cycle_is_a_limit_error() {
    let err = common::first_error("a = {}\nb = {\"__isa\": a}\na.__isa = b\na.missing");
    assert!(err.contains("Limit Exceeded"), "got: {err}");
}

#[test]
fn oversized_string_is_a_limit_error() {
    let err = common::first_error("s = \"abcdefgh\"\ns = s * 10000000");
    assert!(err.contains("Limit Exceeded"), "got: {err}");
}

#[test]
fn execution_stops_after_an_error() {
    let capture = common::run("print(\"before\")\nx = missingThing\nprint(\"after\")");
    assert_eq!(capture.output, vec!["before"]);
    assert_eq!(capture.errors.len(), 1);
}

// ── Literal freshness ─────────────────────────────────────────────

#[test]
fn list_literals_are_fresh_per_execution() {
    let got = common::last_implicit(
        "rows = []\nfor i in range(1, 3)\nrow = [i]\nrows.push(row)\nend for\nrows",
    );
    assert_eq!(got, "[[1], [2], [3]]");
}

#[test]
fn map_literals_are_fresh_per_execution() {
    let got = common::last_implicit(
        "rows = []\nfor i in range(1, 2)\nrows.push({\"n\": i})\nend for\nrows",
    );
    assert_eq!(got, "[{\"n\": 1}, {\"n\": 2}]");
}

// ── Code-form round trip ──────────────────────────────────────────

#[test]
fn code_form_round_trips_through_the_compiler() {
    for src in [
        "[1, 2.5, \"three\"]",
        "{\"a\": [1, 2], \"b\": \"say \"\"hi\"\"\"}",
        "[[1], [2, [3]]]",
        "\"plain\"",
        "42",
    ] {
        let first = common::last_implicit(src);
        let second = common::last_implicit(&first);
        assert_eq!(first, second, "source: {src}");
    }
}
