//! End-to-end tests: textual IR in, assembled program out.

use slotc::core::{CompilationSession, CompileError};
use slotc::ir::Module;
use slotc::program::{AssembleOptions, OutputFormat, ProgramAssembler, DEFAULT_CHECK_SLOT};
use slotc::{compile, compile_to_string, Artifact, Opcode};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn artifact(source: &str) -> Artifact {
    init_logging();
    compile(source, &AssembleOptions::default()).unwrap()
}

fn text(source: &str) -> String {
    init_logging();
    compile_to_string(source, &AssembleOptions::default(), OutputFormat::Text).unwrap()
}

fn error(source: &str) -> CompileError {
    init_logging();
    compile(source, &AssembleOptions::default()).unwrap_err()
}

const INC: &str = "\
define void @inc(i32* %p) {
entry:
  %v = load i32, i32* %p
  %n = add i32 %v, 1
  store i32 %n, i32* %p
  ret void
}

define i32 @main() {
entry:
  %x = alloca i32
  store i32 41, i32* %x
  call void @inc(i32* %x)
  %r = load i32, i32* %x
  ret i32 %r
}
";

#[test]
fn test_inc_through_pointer() {
    assert_eq!(
        text(INC),
        "start = 4\n\
         check = 5\n\
         n_vars = 9\n\
         n_global_vars = 0\n\
         code = [\n\
         # inc()\n\
         \t# entry:\n\
         \t\t ('load', 3, 0, 2) , # 0\n\
         \t\t ('add_const', 4, 1, 3) , # 1\n\
         \t\t ('store', 0, 4, 2) , # 2\n\
         \t\t ('jmp_ind', 0, 0, 1) , # 3\n\
         # main()\n\
         \t# entry:\n\
         \t\t ('store_const', 7, 41, 0) , # 4\n\
         \t\t ('store_const', 2, 7, 0) , # 5\n\
         \t\t ('store_const', 1, 8, 0) , # 6\n\
         \t\t ('jmp', 0, 0, 0) , # 7\n\
         \t\t ('mov', 8, 0, 0) , # 8\n\
         \t\t ('mov', 5, 7, 0) , # 9\n\
         \t\t ('jmp', 11, 0, 0) , # 10\n\
         ]\n"
    );
}

#[test]
fn test_call_sequence_is_patched() {
    let program = artifact(INC);
    let call = &program.code[5..9];
    // One argument store, the return-address store, the jump and the copy-out.
    assert_eq!(call[0].opcode, Opcode::StoreConst);
    assert_eq!(call[1].opcode, Opcode::StoreConst);
    assert_eq!(call[1].a.raw(), 8, "returns right after the call sequence");
    assert_eq!(call[2].opcode, Opcode::Jmp);
    assert_eq!(call[2].dest.raw(), 0, "jumps to the callee's start");
    assert_eq!(call[3].opcode, Opcode::Mov);
}

#[test]
fn test_constant_left_comparison_is_flipped() {
    let source = "\
define i32 @main(i32 %x) {
entry:
  %c = icmp slt i32 5, %x
  br i1 %c, label %yes, label %no
yes:
  ret i32 1
no:
  ret i32 0
}
";
    assert_eq!(
        text(source),
        "start = 0\n\
         check = 0\n\
         n_vars = 4\n\
         n_global_vars = 0\n\
         code = [\n\
         # main()\n\
         \t# entry:\n\
         \t\t ('gt_const', 3, 5, 2) , # 0\n\
         \t\t ('br', 2, 4, 3) , # 1\n\
         \t# yes:\n\
         \t\t ('store_const', 0, 1, 0) , # 2\n\
         \t\t ('jmp', 6, 0, 0) , # 3\n\
         \t# no:\n\
         \t\t ('store_const', 0, 0, 0) , # 4\n\
         \t\t ('jmp', 6, 0, 0) , # 5\n\
         ]\n"
    );
}

#[test]
fn test_jump_into_next_block_is_elided() {
    let source = "\
define i32 @main() {
a:
  %x = alloca i32
  store i32 3, i32* %x
  br label %b
b:
  %v = load i32, i32* %x
  ret i32 %v
}
";
    let program = artifact(source);
    let tags: Vec<String> = program.code.iter().map(|i| i.opcode.to_string()).collect();
    assert_eq!(tags, ["store_const", "mov", "jmp"]);
    assert_eq!(program.code[2].dest.raw(), 3);
}

#[test]
fn test_redundant_block_is_skipped() {
    let source = "\
define i32 @main(i1 %c) {
entry:
  br i1 %c, label %hop, label %out
hop:
  br label %done
out:
  ret i32 0
done:
  ret i32 1
}
";
    let output = text(source);
    assert!(!output.contains("# hop:"), "{output}");
    assert!(output.contains("('br', 3, 1, 2) , # 0"), "{output}");
    assert!(output.contains("\t# done:\n\t\t ('store_const', 0, 1, 0) , # 3"), "{output}");
}

#[test]
fn test_merge_stores_precede_transfers() {
    let source = "\
define i32 @main(i1 %c, i32 %a) {
entry:
  br i1 %c, label %then, label %join
then:
  %y = add i32 %a, 1
  br label %join
join:
  %r = phi i32 [ 0, %entry ], [ %y, %then ]
  ret i32 %r
}
";
    let program = artifact(source);
    let listing: Vec<String> = program.code.iter().map(|i| i.to_artifact()).collect();
    assert_eq!(
        listing,
        [
            "('store_const', 5, 0, 0)",
            "('br', 2, 4, 2)",
            "('add_const', 4, 1, 3)",
            "('mov', 5, 4, 0)",
            "('mov', 0, 5, 0)",
            "('jmp', 6, 0, 0)",
        ]
    );
}

#[test]
fn test_constant_gep_emits_no_address_arithmetic() {
    let source = "\
@m = global [4 x [5 x i32]] zeroinitializer

define i32 @main() {
entry:
  %p = getelementptr inbounds [4 x [5 x i32]], [4 x [5 x i32]]* @m, i64 0, i64 1, i64 2
  store i32 9, i32* %p
  ret i32 0
}
";
    let program = artifact(source);
    assert_eq!(program.n_global_vars, 20);
    assert_eq!(program.code.len(), 3);
    assert_eq!(program.code[0].to_artifact(), "('store_const', 7, 9, 0)");
    assert_eq!(program.check, 20);
}

#[test]
fn test_output_is_deterministic() {
    let first = text(INC);
    for _ in 0..3 {
        assert_eq!(text(INC), first);
    }
}

#[test]
fn test_slot_floor() {
    init_logging();
    let floor = AssembleOptions {
        min_slots: 100,
        ..AssembleOptions::default()
    };
    assert_eq!(compile(INC, &floor).unwrap().n_vars, 100);

    let low = AssembleOptions {
        min_slots: 1,
        ..AssembleOptions::default()
    };
    assert_eq!(compile(INC, &low).unwrap().n_vars, 9);
}

#[test]
fn test_session_counts_allocated_slots() {
    init_logging();
    let module = Module::parse(INC).unwrap();
    let arena = bumpalo::Bump::new();
    let mut session = CompilationSession::new(&arena);
    let program = ProgramAssembler::new(&mut session, &module, AssembleOptions::default())
        .assemble()
        .unwrap();
    assert_eq!(session.slots().allocated(), program.n_vars);
    assert_eq!(session.stats().functions_lowered, 2);
    assert_eq!(session.stats().calls_patched, 1);
}

#[test]
fn test_default_entry_without_main() {
    let program = artifact("define i32 @f() {\nentry:\n  ret i32 7\n}\n");
    assert_eq!(program.start, 0);
    assert_eq!(program.check, DEFAULT_CHECK_SLOT);
    assert_eq!(program.code[1].to_artifact(), "('jmp', 2, 0, 0)");
}

#[test]
fn test_named_entry_option() {
    init_logging();
    let options = AssembleOptions {
        entry: "second".to_string(),
        ..AssembleOptions::default()
    };
    let source = "define i32 @first() {\nentry:\n  ret i32 1\n}\n\
                  define i32 @second() {\nentry:\n  ret i32 2\n}\n";
    let program = compile(source, &options).unwrap();
    assert_eq!(program.start, 2);
    assert_eq!(program.check, 2);
    // Only the entry's return becomes a program exit.
    assert_eq!(program.code[1].opcode, Opcode::JmpInd);
    assert_eq!(program.code[3].to_artifact(), "('jmp', 4, 0, 0)");
}

#[test]
fn test_recursion_is_rejected() {
    let err = error(
        "define i32 @a() {\nentry:\n  %r = call i32 @b()\n  ret i32 %r\n}\n\
         define i32 @b() {\nentry:\n  %r = call i32 @a()\n  ret i32 %r\n}\n",
    );
    assert!(matches!(err, CompileError::UnsupportedConstruct { .. }));
    assert!(err.to_string().contains("recursion (@a -> @b -> @a)"), "{err}");
}

#[test]
fn test_external_call_is_rejected() {
    let err = error(
        "declare i32 @getchar()\ndefine i32 @main() {\nentry:\n  %c = call i32 @getchar()\n  ret i32 %c\n}\n",
    );
    assert!(err.to_string().contains("call to external function @getchar"), "{err}");
}

#[test]
fn test_initializers_are_checked() {
    let err = error("@g = global i32 5\ndefine i32 @main() {\nentry:\n  ret i32 0\n}\n");
    assert!(err.to_string().contains("variable initialization of @g"), "{err}");

    let err = error("@g = global [2 x i32] [i32 1, i32 2]\ndefine i32 @main() {\nentry:\n  ret i32 0\n}\n");
    assert!(err.to_string().contains("array initialization of @g"), "{err}");

    let program = artifact("@g = global i32* null\ndefine i32 @main() {\nentry:\n  ret i32 0\n}\n");
    assert_eq!(program.n_global_vars, 1);
}

#[test]
fn test_constant_global_reference_is_rejected() {
    let err = error(
        "@k = constant i32 3\ndefine i32 @main() {\nentry:\n  %v = load i32, i32* @k\n  ret i32 %v\n}\n",
    );
    assert!(matches!(err, CompileError::UnsupportedConstruct { .. }));
    assert!(err.to_string().contains("reference to constant global @k"), "{err}");
    assert!(err.to_string().contains("line 4"), "{err}");
}

#[test]
fn test_unsupported_opcode_names_location() {
    let err = error("define i32 @main(i32 %a) {\nentry:\n  %r = udiv i32 %a, 3\n  ret i32 %r\n}\n");
    assert_eq!(err.to_string(), "unsupported opcode 'udiv' (in @main, line 3)");
}

#[test]
fn test_json_rendering() {
    init_logging();
    let json = compile_to_string(INC, &AssembleOptions::default(), OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["start"], 4);
    assert_eq!(value["code"].as_array().map(Vec::len), Some(11));
    assert_eq!(value["code"][7], serde_json::json!(["jmp", 0, 0, 0]));
}

#[test]
fn test_pointer_loaded_from_structure_field() {
    let source = "\
define i32 @main() {
entry:
  %s = alloca { i32, i32* }
  %x = alloca i32
  store i32 7, i32* %x
  %f = getelementptr { i32, i32* }, { i32, i32* }* %s, i32 0, i32 1
  store i32* %x, i32** %f
  %p = load i32*, i32** %f
  %v = load i32, i32* %p
  ret i32 %v
}
";
    let program = artifact(source);
    let listing: Vec<String> = program.code.iter().map(|i| i.to_artifact()).collect();
    assert_eq!(
        listing,
        [
            "('store_const', 4, 7, 0)",
            "('store_const', 3, 4, 0)",
            "('load', 5, 0, 3)",
            "('mov', 0, 5, 0)",
            "('jmp', 5, 0, 0)",
        ]
    );
    assert_eq!(program.n_vars, 6);
}

#[test]
fn test_slot_space_exhaustion_is_rejected() {
    let err = error(
        "define i32 @main() {\nentry:\n  %a = alloca [3000000000 x i32], align 4\n  \
         %b = alloca [3000000000 x i32], align 4\n  ret i32 0\n}\n",
    );
    assert!(matches!(err, CompileError::UnsupportedConstruct { .. }));
    assert!(err.to_string().contains("slot space exhausted"), "{err}");
    assert!(err.to_string().contains("line 4"), "{err}");
}

#[test]
fn test_bitwise_and_tags() {
    let output = text(
        "define i32 @main(i32 %x, i32 %y) {\nentry:\n  %m = and i32 %x, 3\n  \
         %n = and i32 %m, %y\n  ret i32 %n\n}\n",
    );
    assert!(output.contains("('and__const', 4, 3, 2)"), "{output}");
    assert!(output.contains("('and_', 5, 4, 3)"), "{output}");
}
