mod common;

use common::*;
use taintrace::{Engine, Options, SessionState, ShadowEngine, TraceError, TraceOutcome, Tracer};

fn armed_tracer(options: Options) -> (Tracer<ShadowEngine>, SessionState) {
    let mut tracer = Tracer::new(options.clone(), ShadowEngine::new());
    let mut state = SessionState::new();
    state.restart(tracer.engine_mut(), &options);
    state.trigger.enable();
    (tracer, state)
}

fn symbolic_options() -> Options {
    Options {
        use_symbolic_engine: true,
        ..quiet_options()
    }
}

#[test]
fn test_dormant_trace_has_no_side_effects() {
    let mut tracer = Tracer::new(quiet_options(), ShadowEngine::new());
    let mut state = SessionState::new();
    let mut host = code_host();

    for address in [MOV, CMP, JZ, 0xdead] {
        let outcome = tracer.trace(&mut state, &mut host, address, 1);
        assert!(matches!(outcome, TraceOutcome::Dormant));
    }

    assert!(state.last_instruction.is_none());
    assert!(state.constraints.is_empty());
    assert!(!state.something_tainted_or_symbolized);
    assert!(host.colors.is_empty());
    assert!(host.comments.is_empty());
    assert!(host.renames.is_empty());
}

#[test]
fn test_taken_branch_records_target_first() {
    let options = symbolic_options();
    let (mut tracer, mut state) = armed_tracer(options.clone());
    let mut host = code_host();
    host.set_register("rdi", 5);
    host.set_register("rflags", ZF);
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);
    let outcome = tracer.trace(&mut state, &mut host, JZ, 1);

    match outcome {
        TraceOutcome::Traced {
            symbolized: true,
            constraint: Some(constraint),
            ..
        } => {
            assert_eq!(constraint.source, JZ);
            assert_eq!(constraint.taken, INC);
            assert_eq!(constraint.not_taken, XOR);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(state.constraints.len(), 1);
    assert_eq!(host.colors.get(&JZ), Some(&options.color_tainted_condition));
    assert_eq!(host.colors.get(&MOV), Some(&options.color_tainted));
    assert!(state.something_tainted_or_symbolized);
}

#[test]
fn test_fall_through_records_next_address_first() {
    let (mut tracer, mut state) = armed_tracer(symbolic_options());
    let mut host = code_host();
    host.set_register("rdi", 7);
    host.set_register("rflags", 0);
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);
    tracer.trace(&mut state, &mut host, JZ, 1);

    let constraint = state.constraints.last().unwrap();
    assert_eq!(constraint.taken, XOR);
    assert_eq!(constraint.not_taken, INC);
}

#[test]
fn test_trace_twice_evaluates_twice() {
    let (mut tracer, mut state) = armed_tracer(symbolic_options());
    let mut host = code_host();
    host.set_register("rflags", ZF);
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);
    tracer.trace(&mut state, &mut host, JZ, 1);
    tracer.trace(&mut state, &mut host, JZ, 1);

    assert_eq!(state.constraints.len(), 2);
    assert_eq!(state.constraints.at(JZ).count(), 2);
}

#[test]
fn test_untainted_branch_records_nothing() {
    let (mut tracer, mut state) = armed_tracer(symbolic_options());
    let mut host = code_host();
    host.set_register("rflags", ZF);

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);
    let outcome = tracer.trace(&mut state, &mut host, JZ, 1);

    assert!(matches!(
        outcome,
        TraceOutcome::Traced {
            tainted: false,
            symbolized: false,
            constraint: None
        }
    ));
    assert!(state.constraints.is_empty());
    assert!(host.colors.is_empty());
}

#[test]
fn test_taint_only_branch_records_nothing() {
    let (mut tracer, mut state) = armed_tracer(quiet_options());
    let mut host = code_host();
    host.set_register("rflags", ZF);
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);
    let outcome = tracer.trace(&mut state, &mut host, JZ, 1);

    assert!(matches!(
        outcome,
        TraceOutcome::Traced {
            tainted: true,
            symbolized: false,
            constraint: None
        }
    ));
    assert!(state.constraints.is_empty());
}

#[test]
fn test_unmapped_address_is_abandoned() {
    let (mut tracer, mut state) = armed_tracer(quiet_options());
    let mut host = code_host();

    let outcome = tracer.trace(&mut state, &mut host, 0x9000, 3);

    assert!(matches!(
        outcome,
        TraceOutcome::Abandoned(TraceError::Decode { address: 0x9000 })
    ));
    let last = state.last_instruction.as_ref().unwrap();
    assert_eq!(last.address, 0x9000);
    assert_eq!(last.thread_id, 3);
    assert!(last.opcode.is_empty());

    // the session carries on
    assert!(tracer.trace(&mut state, &mut host, MOV, 3).is_traced());
}

#[test]
fn test_disassembly_failure_is_abandoned() {
    let mut engine = ScriptedEngine::new();
    engine.fail_disassembly.insert(0x1004);
    let mut tracer = Tracer::new(quiet_options(), engine);
    let mut state = SessionState::new();
    state.trigger.enable();
    let mut host = nop_host();

    let outcome = tracer.trace(&mut state, &mut host, 0x1004, 1);

    match outcome {
        TraceOutcome::Abandoned(TraceError::Disassembly { address, opcodes, .. }) => {
            assert_eq!(address, 0x1004);
            assert_eq!(opcodes.0, vec![0x90]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(state.last_address(), Some(0x1004));
    assert!(tracer.engine().built.is_empty());
}

#[test]
fn test_semantics_failure_is_abandoned() {
    let mut engine = ScriptedEngine::new().with(0x1004, Semantics::tainted());
    engine.fail_semantics.insert(0x1004);
    let mut tracer = Tracer::new(quiet_options(), engine);
    let mut state = SessionState::new();
    state.trigger.enable();
    let mut host = nop_host();

    let outcome = tracer.trace(&mut state, &mut host, 0x1004, 1);

    match outcome {
        TraceOutcome::Abandoned(err @ TraceError::Semantics { address: 0x1004, .. }) => {
            assert!(err.to_string().starts_with("building semantics failed at 0x1004"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    let last = state.last_instruction.as_ref().unwrap();
    assert_eq!(last.disassembly, "insn_1004");
    assert!(!last.is_tainted());
    assert!(host.colors.is_empty());
}

#[test]
fn test_tainted_function_renamed_once() {
    let options = Options {
        rename_tainted_function_names: true,
        ..quiet_options()
    };
    let (mut tracer, mut state) = armed_tracer(options);
    let mut host = code_host();
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);
    tracer.trace(&mut state, &mut host, CMP, 1);

    assert_eq!(
        host.renames.get(&0x1000).map(String::as_str),
        Some("T000_check")
    );
    assert_eq!(state.tainted_functions_index, 1);
}

#[test]
fn test_comments_and_trusted_operands() {
    let options = Options {
        add_comments_controlled_operands: true,
        add_comments_symbolic_expressions: true,
        ..symbolic_options()
    };
    let (mut tracer, mut state) = armed_tracer(options);
    let mut host = code_host();
    tracer.engine_mut().taint_register("rdi").unwrap();

    tracer.trace(&mut state, &mut host, MOV, 1);

    let comments = host.comments.get(&MOV).unwrap();
    assert!(comments.iter().any(|c| c == "Controlled operands: rdi"));
    assert!(comments.iter().any(|c| c.contains("rax :=")));

    let last = state.last_instruction.as_ref().unwrap();
    assert!(!last.operands.is_empty());
    assert!(last.operands.iter().all(|op| op.trusted));
}

#[test]
fn test_trace_replaces_current_instruction() {
    let (mut tracer, mut state) = armed_tracer(quiet_options());
    let mut host = code_host();

    tracer.trace(&mut state, &mut host, MOV, 1);
    assert_eq!(state.last_address(), Some(MOV));
    tracer.trace(&mut state, &mut host, CMP, 2);

    let last = state.last_instruction.as_ref().unwrap();
    assert_eq!(last.address, CMP);
    assert_eq!(last.thread_id, 2);
    assert_eq!(last.opcode, vec![0x48, 0x83, 0xf8, 0x05]);
    assert_eq!(last.next_address, JZ);
}
