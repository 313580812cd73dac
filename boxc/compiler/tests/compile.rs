//! End-to-end tests: Box source through the parser and compiler, asserted
//! against the emitted LIR and the installed procedures.

use boxc_compiler::{compile_str, CompileError, Compiler, Level};
use boxc_ir::GenOp;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse and compile, returning the compiler for inspection.
fn compile(source: &str) -> (Compiler, bool) {
    init_logging();
    let ast = boxc_parser::parse(source).expect("test program must parse");
    let mut compiler = Compiler::new();
    let sane = compiler.compile(&ast);
    (compiler, sane)
}

fn lir_text(compiler: &Compiler) -> String {
    compiler.main_lir().to_string()
}

#[test]
fn arithmetic_folds_through_temporaries() {
    let (c, sane) = compile("Print[1 + 2 * 3]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    // 2 * 3 first: the left immediate moves into a temporary.
    assert!(lir.contains("mov ri1, 2"), "lir:\n{lir}");
    assert!(lir.contains("mul ri1, 3"), "lir:\n{lir}");
    // 1 + t reuses the temporary thanks to the commutative swap.
    assert!(lir.contains("add ri1, 1"), "lir:\n{lir}");
    // The result is passed by address in the child register.
    assert!(lir.contains("lea gro2, ri1"), "lir:\n{lir}");
    assert_eq!(c.main_lir().count_op(GenOp::Call), 1);
}

#[test]
fn variables_declare_bind_and_read_back() {
    let (c, sane) = compile("a = 10, b = a + 1, Print[b]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    assert!(lir.contains("mov gvi1, 10"), "lir:\n{lir}");
    assert!(lir.contains("mov ri1, gvi1"), "lir:\n{lir}");
    assert!(lir.contains("add ri1, 1"), "lir:\n{lir}");
    assert!(lir.contains("mov gvi2, ri1"), "lir:\n{lir}");
    // `b` is passed to Print straight from its variable register.
    assert!(lir.contains("lea gro2, gvi2"), "lir:\n{lir}");
}

#[test]
fn if_else_emits_one_conditional_and_one_jump() {
    let (c, sane) = compile(r#"If[1 < 2], "ok"; Else, "no"; Print["done"]"#);
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    assert_eq!(c.main_lir().count_op(GenOp::Jc), 1, "lir:\n{}", lir_text(&c));
    assert_eq!(c.main_lir().count_op(GenOp::Jmp), 1, "lir:\n{}", lir_text(&c));

    let lir = lir_text(&c);
    // The condition lands in a temporary and is tested via the scratch
    // register.
    assert!(lir.contains("lt ri2, 2"), "lir:\n{lir}");
    assert!(lir.contains("mov ri0, ri1"), "lir:\n{lir}");
}

#[test]
fn structure_values_move_members_to_computed_offsets() {
    let (c, sane) = compile("p = (1, 2.5)");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    // The anonymous structure is constructed, then both members are moved
    // in: Int at offset 0, Real aligned at offset 8.
    assert!(lir.contains("create ro1"), "lir:\n{lir}");
    assert!(lir.contains("mov i[ro1], 1"), "lir:\n{lir}");
    assert!(lir.contains("mov r[ro1+8], 2.5"), "lir:\n{lir}");
    // The fresh temporary is handed to the variable without a copy.
    assert!(lir.contains("ref gvo1, ro1"), "lir:\n{lir}");
}

#[test]
fn combination_definition_compiles_a_sub_procedure() {
    let (c, sane) = compile("MyType = Int, Int@MyType[$$ = $]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let listing = c.vm.disasm_all();
    assert!(listing.contains("Int@MyType"), "vm:\n{listing}");
    // Prototype prologue: parent and child arrive in the well-known global
    // object registers.
    assert!(listing.contains("ref ro1, gro1"), "vm:\n{listing}");
    assert!(listing.contains("ref ro2, gro2"), "vm:\n{listing}");
    // The body: child slot to parent slot.
    assert!(listing.contains("mov i[ro1], i[ro2]"), "vm:\n{listing}");

    // The outer procedure was restored: none of the body's instructions
    // leaked into main.
    let main = lir_text(&c);
    assert!(!main.contains("gro1"), "main:\n{main}");
    assert!(!main.contains("i[ro2]"), "main:\n{main}");
}

#[test]
fn extern_comb_declaration_installs_the_named_symbol() {
    let (c, sane) = compile("Int@Print ? \"my_print_int\", Print[5]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    assert!(c.vm.disasm_all().contains("my_print_int"));

    // The new declaration shadows the builtin combination for Int.
    let lir = lir_text(&c);
    assert!(lir.contains("call"), "lir:\n{lir}");
}

#[test]
fn pointers_reference_and_guarded_dereference() {
    let (c, sane) = compile("x = 10, p = &x, *p = 5");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    assert!(lir.contains("lea rP1, gvi1"), "lir:\n{lir}");
    assert!(lir.contains("ref gvP1, rP1"), "lir:\n{lir}");
    assert!(lir.contains("notnul i[gvo1]"), "lir:\n{lir}");
    assert!(lir.contains("mov i[gvo1], 5"), "lir:\n{lir}");
}

#[test]
fn structure_types_and_member_access() {
    let (c, sane) = compile("V = (Int x, Real y), v = V[], a = v.x, b = v.y");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    assert!(lir.contains("mov gvi1, i[gvo1]"), "lir:\n{lir}");
    assert!(lir.contains("mov gvr1, r[gvo1+8]"), "lir:\n{lir}");
}

#[test]
fn point_members_go_through_component_pointers() {
    let (c, sane) = compile("pt = Point[], d = pt.x");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    assert!(lir.contains("pptrx"), "lir:\n{lir}");
    assert!(lir.contains("mov gvr1, r[ro1]"), "lir:\n{lir}");
}

#[test]
fn subtype_build_fills_child_and_parent_pointers() {
    let (c, sane) = compile("P = Point, P.Origin = Point, q = P[], o = q.Origin");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    // The subtype object is created, then its two pointer fields are set:
    // the fresh child at offset 0, the parent at offset 16.
    assert!(lir.contains("create"), "lir:\n{lir}");
    assert!(lir.contains("ref P[ro1],"), "lir:\n{lir}");
    assert!(lir.contains("ref P[ro1+16],"), "lir:\n{lir}");
}

#[test]
fn species_children_expand_to_the_target() {
    let (c, sane) = compile("S = (Int => Real)\nS@Print ? \"print_s\"\nPrint[5]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());

    let lir = lir_text(&c);
    // The Int child expands to the species target before the call.
    assert!(lir.contains("real rr1, 5"), "lir:\n{lir}");
    assert!(c.vm.disasm_all().contains("print_s"));
}

#[test]
fn raised_types_inherit_combinations_but_not_operations() {
    let (c, sane) = compile("R = ^Int, x = R[10], y = ^x, z = y + 1");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    let lir = lir_text(&c);
    assert!(lir.contains("add"), "lir:\n{lir}");

    // Without un-raising, the raised type matches no operation.
    let (c, sane) = compile("R = ^Int, x = R[10], z = x + 1");
    assert!(!sane);
    assert!(c
        .diagnostics()
        .errors()
        .any(|d| d.message.contains("not defined")));
}

#[test]
fn for_loops_jump_back_to_the_box_body() {
    let (c, sane) = compile("[Print[\"tick\"], For[1]]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    assert_eq!(c.main_lir().count_op(GenOp::Jc), 1);
    let lir = lir_text(&c);
    assert!(lir.contains("jc L1"), "lir:\n{lir}");
}

#[test]
fn compound_assignment_mutates_in_place() {
    let (c, sane) = compile("i = 1, i += 2, i *= 3");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    let lir = lir_text(&c);
    assert!(lir.contains("add gvi1, 2"), "lir:\n{lir}");
    assert!(lir.contains("mul gvi1, 3"), "lir:\n{lir}");
}

#[test]
fn postfix_increment_preserves_the_old_value() {
    let (c, sane) = compile("i = 1, j = i++");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    let lir = lir_text(&c);
    // The old value moves into a temporary before the increment.
    assert!(lir.contains("mov ri1, gvi1"), "lir:\n{lir}");
    assert!(lir.contains("inc gvi1"), "lir:\n{lir}");
    assert!(lir.contains("mov gvi2, ri1"), "lir:\n{lir}");
}

#[test]
fn string_boxes_append_their_children() {
    let (c, sane) = compile("s = Str[\"n = \", 42]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    let lir = lir_text(&c);
    assert!(lir.contains("create"), "lir:\n{lir}");
    // The string constant's constructor plus two append calls.
    assert!(c.main_lir().count_op(GenOp::Call) >= 3, "lir:\n{lir}");
}

#[test]
fn else_without_if_is_an_error() {
    let (c, sane) = compile("Else");
    assert!(!sane);
    assert!(c
        .diagnostics()
        .errors()
        .any(|d| d.message.contains("`Else` without `If`")));
}

#[test]
fn double_else_is_an_error() {
    let (c, sane) = compile("If[1 < 2], Else, Else");
    assert!(!sane);
    assert!(c
        .diagnostics()
        .errors()
        .any(|d| d.message.contains("double `Else`")));
}

#[test]
fn box_floors_scope_variables() {
    let (c, sane) = compile("[b = 2], Print[b]");
    assert!(!sane);
    assert!(c
        .diagnostics()
        .errors()
        .any(|d| d.message.contains("undefined")));
}

#[test]
fn poison_propagates_without_cascading() {
    let (c, sane) = compile("Print[1 + \"s\"]");
    assert!(!sane);
    // Exactly one error: the missing overload. The poisoned node emits
    // nothing.
    assert_eq!(c.diagnostics().errors().count(), 1);
    assert_eq!(c.main_lir().count_op(GenOp::Add), 0);
}

#[test]
fn unknown_statement_values_warn_and_compile_on() {
    let (c, sane) = compile("3.25");
    assert!(sane);
    assert!(c
        .diagnostics()
        .warnings()
        .any(|d| d.message.contains("don't know how to use")));
}

#[test]
fn balance_invariants_hold_after_compilation() {
    let (c, sane) = compile("a = 1, b = (a + 2) * 3, If[b < 5], c = b; Else, c = 0; Print[b]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    assert_eq!(c.ns_depth(), 1, "only the root floor survives");
    assert_eq!(c.main_temps_in_use(), 0, "all temporaries released");
}

#[test]
fn leak_freedom_across_a_compilation() {
    init_logging();
    let ast = boxc_parser::parse("a = 1, Print[a + 2], p = (1, 2.5)").unwrap();
    let mut compiler = Compiler::new();
    let live_before = compiler.live_values();
    assert!(compiler.compile(&ast));
    assert_eq!(compiler.live_values(), live_before);
}

#[test]
fn installation_synthesizes_frame_and_ret() {
    init_logging();
    let compiled = compile_str("a = 10, b = a + 1, Print[b]").unwrap();
    let listing = compiled.vm.disasm(compiled.main).unwrap();
    assert!(listing.contains("main"), "listing:\n{listing}");
    assert!(listing.contains("newi 2, 1"), "listing:\n{listing}");
    assert!(listing.trim_end().ends_with("ret"), "listing:\n{listing}");
}

#[test]
fn instructions_carry_source_locations() {
    init_logging();
    let compiled = compile_str("a = 10").unwrap();
    // pc 0 is the synthesized frame prologue, pc 1 the move.
    assert!(compiled.vm.source_at(compiled.main, 0).unwrap().is_default());
    let loc = compiled.vm.source_at(compiled.main, 1).unwrap();
    assert!(!loc.is_default());
    assert!(loc.offset().unwrap() <= 6);
}

#[test]
fn insane_compilations_are_not_installed() {
    init_logging();
    match compile_str("Print[undefined_thing + 1]") {
        Err(CompileError::Insane { diags }) => {
            assert!(diags.iter().any(|d| d.level == Level::Error));
        }
        other => panic!("expected an insane compilation, got {:?}", other.is_ok()),
    }
}

#[test]
fn parse_errors_surface_as_compile_errors() {
    init_logging();
    assert!(matches!(
        compile_str("()"),
        Err(CompileError::Parse(_))
    ));
}

#[test]
fn compile_file_round_trips() {
    init_logging();
    let dir = std::env::temp_dir();
    let path = dir.join("boxc_compile_file_test.box");
    std::fs::write(&path, "Print[\"hello\"]\n").unwrap();
    let compiled = boxc_compiler::compile_file(&path).unwrap();
    assert!(compiled.vm.disasm(compiled.main).is_some());
    std::fs::remove_file(&path).ok();
}

#[test]
fn pause_separators_invoke_the_pause_combination() {
    // Inside a Print box the pause combination exists and is called.
    let (c, sane) = compile("Print[\"a\"; \"b\"]");
    assert!(sane, "diagnostics: {:?}", c.diagnostics().records());
    // Three calls: two strings plus the pause; plus two string-constructor
    // calls.
    let lir = lir_text(&c);
    let calls = c.main_lir().count_op(GenOp::Call);
    assert!(calls >= 5, "expected the pause call too:\n{lir}");
}
