// Instruction set: opcodes, field extraction and disassembly.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Br   = 0x0, // branch
    Add  = 0x1, // add
    Ld   = 0x2, // load
    St   = 0x3, // store
    Jsr  = 0x4, // jump register
    And  = 0x5, // bitwise and
    Ldr  = 0x6, // load register
    Str  = 0x7, // store register
    Rti  = 0x8, // return from interrupt (supervisor only)
    Not  = 0x9, // bitwise not
    Ldi  = 0xA, // load indirect
    Sti  = 0xB, // store indirect
    Jmp  = 0xC, // jump
    Res  = 0xD, // reserved
    Lea  = 0xE, // load effective address
    Trap = 0xF, // trap
}

impl Opcode {
    pub fn from_bits(op: u16) -> Opcode {
        match op & 0xF {
            0x0 => Opcode::Br,
            0x1 => Opcode::Add,
            0x2 => Opcode::Ld,
            0x3 => Opcode::St,
            0x4 => Opcode::Jsr,
            0x5 => Opcode::And,
            0x6 => Opcode::Ldr,
            0x7 => Opcode::Str,
            0x8 => Opcode::Rti,
            0x9 => Opcode::Not,
            0xA => Opcode::Ldi,
            0xB => Opcode::Sti,
            0xC => Opcode::Jmp,
            0xD => Opcode::Res,
            0xE => Opcode::Lea,
            _   => Opcode::Trap,
        }
    }
}

/// Condition codes. The discriminants line up with the n/z/p bits of BR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Pos = 0b001,
    Zro = 0b010,
    Neg = 0b100,
}

impl Cond {
    /// Classify a register value. Total: every word maps to exactly one flag.
    pub fn of(val: u16) -> Cond {
        match val {
            0                        => Cond::Zro,
            n if bit(n, 15) == 0     => Cond::Pos,
            _                        => Cond::Neg,
        }
    }

    pub fn bits(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cond::Neg => f.write_str("N"),
            Cond::Zro => f.write_str("Z"),
            Cond::Pos => f.write_str("P"),
        }
    }
}

pub mod trap {
    pub const GETC:  u16 = 0x20;
    pub const OUT:   u16 = 0x21;
    pub const PUTS:  u16 = 0x22;
    pub const IN:    u16 = 0x23;
    pub const PUTSP: u16 = 0x24;
    pub const HALT:  u16 = 0x25;

    pub fn name(vector: u16) -> Option<&'static str> {
        match vector {
            GETC  => Some("GETC"),
            OUT   => Some("OUT"),
            PUTS  => Some("PUTS"),
            IN    => Some("IN"),
            PUTSP => Some("PUTSP"),
            HALT  => Some("HALT"),
            _     => None,
        }
    }
}

pub fn bits(word: u16, start: u16, len: u32) -> u16 {
    let mask = (1u32 << len) - 1;
    (mask as u16) & (word >> start)
}

pub fn bit(word: u16, n: u16) -> u16 {
    bits(word, n, 1)
}

/// Two's complement sign extension of the low `bitlen` bits of `word`.
pub fn sign_extend(word: u16, bitlen: u16) -> u16 {
    let msb = bits(word, bitlen - 1, 1);
    match msb {
        0 => word,
        _ => word | (0xFFFF << bitlen),
    }
}

pub fn sextbits(word: u16, start: u16, len: u16) -> u16 {
    sign_extend(bits(word, start, len as u32), len)
}

/// A fetched instruction word. Every accessor is a pure bit extraction;
/// which ones are meaningful depends on the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr(pub u16);

impl Instr {
    pub fn opcode(self) -> Opcode {
        Opcode::from_bits(bits(self.0, 12, 4))
    }

    /// Destination register (also the source register of ST/STI/STR).
    pub fn dr(self) -> usize {
        bits(self.0, 9, 3) as usize
    }

    /// First source register, also the base register of JMP/JSRR/LDR/STR.
    pub fn sr1(self) -> usize {
        bits(self.0, 6, 3) as usize
    }

    pub fn sr2(self) -> usize {
        bits(self.0, 0, 3) as usize
    }

    pub fn imm_mode(self) -> bool {
        bit(self.0, 5) == 1
    }

    pub fn imm5(self) -> u16 {
        sextbits(self.0, 0, 5)
    }

    pub fn off6(self) -> u16 {
        sextbits(self.0, 0, 6)
    }

    pub fn pc_off9(self) -> u16 {
        sextbits(self.0, 0, 9)
    }

    pub fn pc_off11(self) -> u16 {
        sextbits(self.0, 0, 11)
    }

    /// JSR (PC-relative) when set, JSRR (register) otherwise.
    pub fn jsr_long(self) -> bool {
        bit(self.0, 11) == 1
    }

    pub fn nzp(self) -> u16 {
        bits(self.0, 9, 3)
    }

    pub fn trapvect8(self) -> u16 {
        bits(self.0, 0, 8)
    }
}

fn signed(w: u16) -> i16 {
    w as i16
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let i = *self;
        match i.opcode() {
            Opcode::Add | Opcode::And => {
                let name = if i.opcode() == Opcode::Add { "ADD" } else { "AND" };
                if i.imm_mode() {
                    write!(f, "{} R{}, R{}, #{}", name, i.dr(), i.sr1(), signed(i.imm5()))
                } else {
                    write!(f, "{} R{}, R{}, R{}", name, i.dr(), i.sr1(), i.sr2())
                }
            }
            Opcode::Br => {
                let nzp = i.nzp();
                if nzp == 0 {
                    return f.write_str("NOP");
                }
                f.write_str("BR")?;
                if nzp != 0b111 {
                    if nzp & Cond::Neg.bits() != 0 { f.write_str("n")?; }
                    if nzp & Cond::Zro.bits() != 0 { f.write_str("z")?; }
                    if nzp & Cond::Pos.bits() != 0 { f.write_str("p")?; }
                }
                write!(f, " #{}", signed(i.pc_off9()))
            }
            Opcode::Jmp if i.sr1() == 7 => f.write_str("RET"),
            Opcode::Jmp => write!(f, "JMP R{}", i.sr1()),
            Opcode::Jsr if i.jsr_long() => write!(f, "JSR #{}", signed(i.pc_off11())),
            Opcode::Jsr => write!(f, "JSRR R{}", i.sr1()),
            Opcode::Ld  => write!(f, "LD R{}, #{}", i.dr(), signed(i.pc_off9())),
            Opcode::Ldi => write!(f, "LDI R{}, #{}", i.dr(), signed(i.pc_off9())),
            Opcode::Lea => write!(f, "LEA R{}, #{}", i.dr(), signed(i.pc_off9())),
            Opcode::St  => write!(f, "ST R{}, #{}", i.dr(), signed(i.pc_off9())),
            Opcode::Sti => write!(f, "STI R{}, #{}", i.dr(), signed(i.pc_off9())),
            Opcode::Ldr => write!(f, "LDR R{}, R{}, #{}", i.dr(), i.sr1(), signed(i.off6())),
            Opcode::Str => write!(f, "STR R{}, R{}, #{}", i.dr(), i.sr1(), signed(i.off6())),
            Opcode::Not => write!(f, "NOT R{}, R{}", i.dr(), i.sr1()),
            Opcode::Rti => f.write_str("RTI"),
            Opcode::Res => write!(f, ".FILL x{:04X}", i.0),
            Opcode::Trap => match trap::name(i.trapvect8()) {
                Some(name) => f.write_str(name),
                None       => write!(f, "TRAP x{:02X}", i.trapvect8()),
            },
        }
    }
}

/// Instruction encoders, used to assemble test programs.
#[cfg(test)]
pub mod asm {
    use super::{trap, Opcode};

    fn regf(reg: u16, start_bit: u16) -> u16 {
        (reg & 0b111) << start_bit
    }

    fn opc(op: Opcode) -> u16 {
        (op as u16) << 12
    }

    pub fn add(dr: u16, sr1: u16, sr2: u16) -> u16 {
        opc(Opcode::Add) | regf(dr, 9) | regf(sr1, 6) | sr2 & 0b111
    }

    pub fn addi(dr: u16, sr1: u16, imm5: i16) -> u16 {
        opc(Opcode::Add) | regf(dr, 9) | regf(sr1, 6) | (1 << 5) | (imm5 as u16) & 0x1F
    }

    pub fn and(dr: u16, sr1: u16, sr2: u16) -> u16 {
        opc(Opcode::And) | regf(dr, 9) | regf(sr1, 6) | sr2 & 0b111
    }

    pub fn andi(dr: u16, sr1: u16, imm5: i16) -> u16 {
        opc(Opcode::And) | regf(dr, 9) | regf(sr1, 6) | (1 << 5) | (imm5 as u16) & 0x1F
    }

    pub fn not(dr: u16, sr: u16) -> u16 {
        opc(Opcode::Not) | regf(dr, 9) | regf(sr, 6) | 0x3F
    }

    pub fn br(nzp: u16, off9: i16) -> u16 {
        opc(Opcode::Br) | (nzp & 0b111) << 9 | (off9 as u16) & 0x1FF
    }

    pub fn jmp(base: u16) -> u16 {
        opc(Opcode::Jmp) | regf(base, 6)
    }

    pub fn jsr(off11: i16) -> u16 {
        opc(Opcode::Jsr) | (1 << 11) | (off11 as u16) & 0x7FF
    }

    pub fn jsrr(base: u16) -> u16 {
        opc(Opcode::Jsr) | regf(base, 6)
    }

    fn pcrel(op: Opcode, r: u16, off9: i16) -> u16 {
        opc(op) | regf(r, 9) | (off9 as u16) & 0x1FF
    }

    pub fn ld(dr: u16, off9: i16) -> u16 {
        pcrel(Opcode::Ld, dr, off9)
    }

    pub fn ldi(dr: u16, off9: i16) -> u16 {
        pcrel(Opcode::Ldi, dr, off9)
    }

    pub fn lea(dr: u16, off9: i16) -> u16 {
        pcrel(Opcode::Lea, dr, off9)
    }

    pub fn st(sr: u16, off9: i16) -> u16 {
        pcrel(Opcode::St, sr, off9)
    }

    pub fn sti(sr: u16, off9: i16) -> u16 {
        pcrel(Opcode::Sti, sr, off9)
    }

    pub fn ldr(dr: u16, base: u16, off6: i16) -> u16 {
        opc(Opcode::Ldr) | regf(dr, 9) | regf(base, 6) | (off6 as u16) & 0x3F
    }

    pub fn str(sr: u16, base: u16, off6: i16) -> u16 {
        opc(Opcode::Str) | regf(sr, 9) | regf(base, 6) | (off6 as u16) & 0x3F
    }

    pub fn trap(vector: u16) -> u16 {
        opc(Opcode::Trap) | vector & 0xFF
    }

    pub fn halt() -> u16 {
        trap(trap::HALT)
    }

    pub fn puts() -> u16 {
        trap(trap::PUTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_extend_negative_extremes() {
        assert_eq!(sign_extend(0b10000, 5), 0xFFF0);
        assert_eq!(sign_extend(0b100000, 6), 0xFFE0);
        assert_eq!(sign_extend(0x100, 9), 0xFF00);
        assert_eq!(sign_extend(0x400, 11), 0xFC00);
        assert_eq!(sign_extend(0b01111, 5), 0x000F);
    }

    #[test]
    fn flags_at_boundaries() {
        assert_eq!(Cond::of(0x0000), Cond::Zro);
        assert_eq!(Cond::of(0x8000), Cond::Neg);
        assert_eq!(Cond::of(0x7FFF), Cond::Pos);
        assert_eq!(Cond::of(0xFFFF), Cond::Neg);
    }

    #[test]
    fn decodes_fields() {
        // ADD R3, R5, #-2
        let i = Instr(asm::addi(3, 5, -2));
        assert_eq!(i.opcode(), Opcode::Add);
        assert_eq!(i.dr(), 3);
        assert_eq!(i.sr1(), 5);
        assert!(i.imm_mode());
        assert_eq!(i.imm5(), 0xFFFE);

        let i = Instr(asm::add(1, 2, 6));
        assert!(!i.imm_mode());
        assert_eq!(i.sr2(), 6);

        let i = Instr(asm::jsr(-1));
        assert!(i.jsr_long());
        assert_eq!(i.pc_off11(), 0xFFFF);
    }

    #[test]
    fn every_word_decodes() {
        assert_eq!(Instr(0xD000).opcode(), Opcode::Res);
        assert_eq!(Instr(0x8000).opcode(), Opcode::Rti);
        assert_eq!(Instr(0xFFFF).opcode(), Opcode::Trap);
    }

    #[test]
    fn disassembles() {
        assert_eq!(Instr(asm::addi(1, 2, -3)).to_string(), "ADD R1, R2, #-3");
        assert_eq!(Instr(asm::and(0, 0, 7)).to_string(), "AND R0, R0, R7");
        assert_eq!(Instr(asm::br(0b110, 5)).to_string(), "BRnz #5");
        assert_eq!(Instr(asm::br(0b111, -1)).to_string(), "BR #-1");
        assert_eq!(Instr(asm::jmp(7)).to_string(), "RET");
        assert_eq!(Instr(asm::jsrr(2)).to_string(), "JSRR R2");
        assert_eq!(Instr(asm::ldr(0, 6, 1)).to_string(), "LDR R0, R6, #1");
        assert_eq!(Instr(asm::halt()).to_string(), "HALT");
        assert_eq!(Instr(asm::trap(0x30)).to_string(), "TRAP x30");
        assert_eq!(Instr(0xD123).to_string(), ".FILL xD123");
    }

    proptest! {
        #[test]
        fn sign_extend_truncates_back(field in any::<u16>(), width in prop::sample::select(vec![5u16, 6, 9, 11])) {
            let mask = (1u16 << width) - 1;
            let raw = field & mask;
            let ext = sign_extend(raw, width);
            prop_assert_eq!(ext & mask, raw);
            prop_assert_eq!(ext as i16 as i32, ((raw << (16 - width)) as i16 >> (16 - width)) as i32);
        }

        #[test]
        fn cond_is_total(v in any::<u16>()) {
            let expected = if v == 0 { Cond::Zro } else if v & 0x8000 != 0 { Cond::Neg } else { Cond::Pos };
            prop_assert_eq!(Cond::of(v), expected);
        }
    }
}
