//! Disassembler.
//!
//! Converts instruction bytes back to readable assembly.

use crate::cpu::decode::{branch_target, decode, Instruction};
use crate::cpu::memory::{Memory, DATA_SIZE, MEMORY_SIZE, PROGRAM_START};

/// Disassemble the instruction at `pc`.
///
/// `pc` is only used to resolve the landing address of a BEQZ.
pub fn disassemble_instruction(pc: u8, bytes: [u8; 3]) -> String {
    match decode(bytes) {
        Ok(decoded) => format_instruction(pc, &decoded),
        Err(_) => format!("??? {:#04x}", bytes[0]),
    }
}

/// Disassemble `count` consecutive instruction slots starting at `start`.
pub fn disassemble_range(mem: &Memory, start: u8, count: usize) -> Vec<(u8, String)> {
    (0..count)
        .map(|i| start as usize + i * 3)
        .take_while(|&addr| addr + 3 <= MEMORY_SIZE)
        .map(|addr| {
            let addr = addr as u8;
            (addr, disassemble_instruction(addr, mem.fetch(addr)))
        })
        .collect()
}

/// Disassemble a whole image: the data region, then the program from
/// 0x08 up to and including the first HALT.
pub fn disassemble(mem: &Memory) -> String {
    let mut output = String::new();
    output.push_str("; data\n");

    let cells: Vec<String> = mem.data().iter().map(|b| format!("{:02X}", b)).collect();
    output.push_str(&format!("0x00: {}\n", cells.join(" ")));

    output.push_str("\n; program\n");

    let mut addr = PROGRAM_START as usize;
    while addr + 3 <= MEMORY_SIZE {
        let bytes = mem.fetch(addr as u8);
        let line = disassemble_instruction(addr as u8, bytes);
        output.push_str(&format!(
            "0x{:02X}: {:02X} {:02X} {:02X}  {}\n",
            addr, bytes[0], bytes[1], bytes[2], line
        ));

        if matches!(decode(bytes), Ok(Instruction::Halt)) {
            break;
        }
        addr += 3;
    }

    output
}

/// Format a decoded instruction as assembly text.
fn format_instruction(pc: u8, instr: &Instruction) -> String {
    let name = instr.mnemonic();
    match *instr {
        // Transfer
        Instruction::Load { reg, addr } | Instruction::Store { reg, addr } => {
            format!("{} r{}, [{}]", name, reg, format_addr(addr))
        }

        // Arithmetic
        Instruction::Add { dst, src } | Instruction::Sub { dst, src } => {
            format!("{} r{}, r{}", name, dst, src)
        }
        Instruction::Addi { reg, imm } | Instruction::Subi { reg, imm } => {
            format!("{} r{}, #{}", name, reg, imm)
        }

        // Control
        Instruction::Jump { addr } => format!("{} 0x{:02X}", name, addr),
        Instruction::Beqz { reg, offset } => format!(
            "{} r{}, +0x{:02X}  ; -> 0x{:02X}",
            name,
            reg,
            offset,
            branch_target(pc, offset)
        ),
        Instruction::Halt => name.to_string(),
    }
}

/// Addresses in the data region are shown as cell numbers.
fn format_addr(addr: u8) -> String {
    if (addr as usize) < DATA_SIZE {
        format!("{}", addr)
    } else {
        format!("0x{:02X}", addr)
    }
}
