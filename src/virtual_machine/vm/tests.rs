use super::*;
use crate::virtual_machine::assembler::assemble_thread;

const STEP_LIMIT: usize = 10_000;

/// Runs one thread to completion, collecting every non-`Continue` signal.
fn run_thread_with(source: &str, memory: &mut Memory) -> (Frame, Vec<Signal>) {
    let program = assemble_thread(source).expect("assembly failed");
    let mut frame = Frame::new(5);
    let mut signals = Vec::new();
    let mut exec = Executor::new(&program, &mut frame, memory);
    for _ in 0..STEP_LIMIT {
        if exec.finished() {
            break;
        }
        match exec.step() {
            Signal::Continue => {}
            other => signals.push(other),
        }
    }
    (frame, signals)
}

fn run_thread(source: &str) -> (Frame, Memory, Vec<Signal>) {
    let mut memory = Memory::new(50);
    let (frame, signals) = run_thread_with(source, &mut memory);
    (frame, memory, signals)
}

fn reg(frame: &Frame, idx: u8) -> i64 {
    frame.registers.get(idx).unwrap()
}

#[test]
fn imm_and_register_arithmetic() {
    let (frame, _, signals) = run_thread(
        r#"
        imm 0, 10
        imm 1, 3
        add 0, 1
        adi 0, 5
        sbi 0, 2
        sub 1, 0
        "#,
    );
    assert_eq!(reg(&frame, 0), 16);
    assert_eq!(reg(&frame, 1), -13);
    assert!(signals.is_empty());
}

#[test]
fn arithmetic_wraps() {
    let (frame, _, _) = run_thread(&format!("imm 0, {}\nadi 0, 1", i64::MAX));
    assert_eq!(reg(&frame, 0), i64::MIN);
}

#[test]
fn direct_and_indirect_memory() {
    let (frame, memory, _) = run_thread(
        r#"
        imm 0, 123
        sto 0, 7
        lod 1, 7
        imm 2, 9
        str 1, 2
        ldr 3, 2
        "#,
    );
    assert_eq!(memory.get(7).unwrap(), 123);
    assert_eq!(memory.get(9).unwrap(), 123);
    assert_eq!(reg(&frame, 1), 123);
    assert_eq!(reg(&frame, 3), 123);
}

#[test]
fn cas_acquires_free_cell() {
    let (frame, memory, _) = run_thread("cas 0, 4\ncas 1, 4");
    assert_eq!(reg(&frame, 0), 0);
    assert_eq!(reg(&frame, 1), 1);
    assert_eq!(memory.get(4).unwrap(), 1);
}

#[test]
fn cas_leaves_nonzero_cell_alone() {
    let mut memory = Memory::new(8);
    memory.set(4, 5).unwrap();
    let (frame, _) = run_thread_with("cas 0, 4", &mut memory);
    assert_eq!(reg(&frame, 0), 5);
    assert_eq!(memory.get(4).unwrap(), 5);
}

#[test]
fn relative_branch_loop() {
    // Counts r0 down from 4, adding 2 to r1 each pass.
    let (frame, _, _) = run_thread(
        r#"
        imm 0, 4
        adi 1, 2
        sbi 0, 1
        btr 0, :-2
        "#,
    );
    assert_eq!(reg(&frame, 0), 0);
    assert_eq!(reg(&frame, 1), 8);
}

#[test]
fn bfs_skips_forward() {
    let (frame, _, _) = run_thread(
        r#"
        bfs 0, :+2
        imm 1, 99
        imm 2, 1
        "#,
    );
    assert_eq!(reg(&frame, 1), 0);
    assert_eq!(reg(&frame, 2), 1);
}

#[test]
fn absolute_and_label_targets() {
    let (frame, _, _) = run_thread(
        r#"
        br 3
        imm 0, 1
        imm 0, 2
        imm 1, 7
        br done
        imm 1, 8
        done:
        "#,
    );
    assert_eq!(reg(&frame, 0), 0);
    assert_eq!(reg(&frame, 1), 7);
    assert_eq!(frame.pc, 7);
}

#[test]
fn absolute_jump_past_end_finishes_thread() {
    let (frame, _, _) = run_thread("br 40\nimm 0, 1");
    assert_eq!(frame.pc, 40);
    assert_eq!(reg(&frame, 0), 0);
}

#[test]
fn lab_is_a_no_op() {
    let (frame, _, signals) = run_thread("lab a\nlab b\nimm 0, 1");
    assert_eq!(reg(&frame, 0), 1);
    assert!(signals.is_empty());
}

#[test]
fn scheduling_signals() {
    let (_, _, signals) = run_thread("yld\nimm 2, 3\npst 2\nblk");
    assert_eq!(
        signals,
        vec![Signal::Yield, Signal::Post(ThreadId(3)), Signal::Block]
    );
}

#[test]
fn print_signals() {
    let (_, _, signals) = run_thread("imm 1, -4\nprt 1\nprs \"lock taken\"");
    assert_eq!(
        signals,
        vec![
            Signal::Print(Output::Value(-4)),
            Signal::Print(Output::Text("lock taken".to_string()))
        ]
    );
}

#[test]
fn err_raises_and_advances() {
    let (frame, _, signals) = run_thread("err inqueue-on-full\nimm 0, 1");
    assert_eq!(
        signals,
        vec![Signal::Fault(Fault::Raised {
            label: "inqueue-on-full".to_string()
        })]
    );
    assert_eq!(reg(&frame, 0), 1);
}

#[test]
fn undefined_instruction_faults_and_advances() {
    let (frame, _, signals) = run_thread("mul 0, 1\nimm 0, 1");
    assert_eq!(
        signals,
        vec![Signal::Fault(Fault::UndefinedInstruction {
            text: "mul 0 1".to_string()
        })]
    );
    assert_eq!(reg(&frame, 0), 1);
}

#[test]
fn relative_jump_before_start_faults() {
    let (frame, _, signals) = run_thread("br :-1\nimm 0, 1");
    assert_eq!(
        signals,
        vec![Signal::Fault(Fault::InvalidJump { pc: 0, offset: -1 })]
    );
    assert_eq!(reg(&frame, 0), 1);
}

#[test]
fn bad_register_faults_without_touching_memory() {
    let (_, memory, signals) = run_thread("cas 9, 4\nimm 0, 1\nsto 0, 60");
    assert_eq!(
        signals,
        vec![
            Signal::Fault(Fault::RegisterOutOfBounds {
                index: 9,
                available: 5
            }),
            Signal::Fault(Fault::AddressOutOfBounds {
                address: 60,
                size: 50
            }),
        ]
    );
    assert_eq!(memory.get(4).unwrap(), 0);
}

#[test]
fn indirect_address_from_negative_register_faults() {
    let (_, _, signals) = run_thread("imm 1, -3\nldr 0, 1");
    assert_eq!(
        signals,
        vec![Signal::Fault(Fault::AddressOutOfBounds {
            address: -3,
            size: 50
        })]
    );
}

#[test]
fn step_past_end_reports_exit() {
    let program = assemble_thread("yld").unwrap();
    let mut frame = Frame::new(5);
    let mut memory = Memory::new(1);
    let mut exec = Executor::new(&program, &mut frame, &mut memory);
    assert_eq!(exec.step(), Signal::Yield);
    assert!(exec.finished());
    assert_eq!(exec.step(), Signal::Exit);
}

#[test]
fn empty_program_is_finished_immediately() {
    let program = Program::default();
    let mut frame = Frame::new(5);
    let mut memory = Memory::new(1);
    let exec = Executor::new(&program, &mut frame, &mut memory);
    assert!(exec.finished());
}

#[test]
fn output_display() {
    assert_eq!(Output::Value(-2).to_string(), "-2");
    assert_eq!(Output::Text("hi there".to_string()).to_string(), "hi there");
}
