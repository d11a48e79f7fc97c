use crate::error::Result;
use crate::memory::Memory;
use crate::opcode_tables::{Descriptor, InstructionTables, Mnemonic, OpcodeForm};
use crate::text;
use log::trace;
use std::fmt::{Display, Error, Formatter};

/// Operand types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// Large constant (2 bytes)
    LargeConstant,
    /// Small constant (1 byte)
    SmallConstant,
    /// Variable number
    Variable,
    /// Omitted (not present)
    Omitted,
}

impl OperandType {
    /// Parse operand type from 2-bit value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }

    /// Get the size in bytes for this operand type
    pub fn size(&self) -> u32 {
        match self {
            OperandType::LargeConstant => 2,
            OperandType::SmallConstant => 1,
            OperandType::Variable => 1,
            OperandType::Omitted => 0,
        }
    }
}

/// One undecoded operand. Variable references are resolved at execution
/// time, since reading variable 0 pops the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub kind: OperandType,
    pub raw: u16,
}

/// Branch information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchInfo {
    /// True if branch on true, false if branch on false
    pub on_true: bool,
    /// Branch offset (0-1 = return false/true, anything else = jump)
    pub offset: i16,
}

/// A decoded Z-Machine instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address of the opcode byte
    pub address: u32,
    pub descriptor: Descriptor,
    pub operands: Vec<Operand>,
    /// Variable to store result (if applicable)
    pub store_var: Option<u8>,
    /// Branch information (if applicable)
    pub branch: Option<BranchInfo>,
    /// Address of the inline string for print and print_ret
    pub text_address: Option<u32>,
    /// Total size of instruction in bytes
    pub size: u32,
}

/// Operand types encoded in the opcode byte of long-form 2OP instructions
fn long_form_types(opcode_byte: u8) -> [OperandType; 2] {
    let kind = |bit: u8| {
        if opcode_byte & bit != 0 {
            OperandType::Variable
        } else {
            OperandType::SmallConstant
        }
    };
    [kind(0x40), kind(0x20)]
}

/// Operand types packed four to a byte, stopping at the first omitted one
fn push_type_byte(types: &mut Vec<OperandType>, type_byte: u8) -> bool {
    for i in 0..4 {
        let kind = OperandType::from_bits(type_byte >> (6 - i * 2));
        if kind == OperandType::Omitted {
            return false;
        }
        types.push(kind);
    }
    true
}

impl Instruction {
    /// Decode an instruction from memory at the given address
    pub fn decode(
        memory: &Memory,
        address: u32,
        tables: &InstructionTables,
        version: u8,
    ) -> Result<Self> {
        let mut offset = address;
        let opcode_byte = memory.read_byte(offset)?;
        offset += 1;

        let descriptor = if opcode_byte == 0xBE && version >= 5 {
            let ext = memory.read_byte(offset)?;
            offset += 1;
            *tables.extended(ext)
        } else {
            *tables.normal(opcode_byte)
        };

        let mut types = Vec::with_capacity(4);
        match descriptor.form {
            OpcodeForm::Op0 => {}
            OpcodeForm::Op1 => {
                types.push(OperandType::from_bits(opcode_byte >> 4));
            }
            OpcodeForm::Op2 if opcode_byte < 0xC0 => {
                types.extend_from_slice(&long_form_types(opcode_byte));
            }
            OpcodeForm::Op2 | OpcodeForm::Var | OpcodeForm::Ext => {
                let first = memory.read_byte(offset)?;
                offset += 1;
                let double = matches!(descriptor.mnemonic, Mnemonic::CallVs2 | Mnemonic::CallVn2);
                if double {
                    // Both type bytes are always present
                    let second = memory.read_byte(offset)?;
                    offset += 1;
                    if push_type_byte(&mut types, first) {
                        push_type_byte(&mut types, second);
                    }
                } else {
                    push_type_byte(&mut types, first);
                }
            }
        }

        let mut operands = Vec::with_capacity(types.len());
        for kind in types {
            let raw = match kind {
                OperandType::LargeConstant => memory.read_word(offset)?,
                OperandType::SmallConstant | OperandType::Variable => {
                    memory.read_byte(offset)? as u16
                }
                OperandType::Omitted => continue,
            };
            offset += kind.size();
            operands.push(Operand { kind, raw });
        }

        let store_var = if descriptor.store {
            let var = memory.read_byte(offset)?;
            offset += 1;
            Some(var)
        } else {
            None
        };

        let branch = if descriptor.branch {
            let (info, len) = Self::decode_branch(memory, offset)?;
            offset += len;
            Some(info)
        } else {
            None
        };

        let text_address =
            if matches!(descriptor.mnemonic, Mnemonic::Print | Mnemonic::PrintRet) {
                let at = offset;
                offset += text::word_len(memory, at)? * 2;
                Some(at)
            } else {
                None
            };

        let instruction = Instruction {
            address,
            descriptor,
            operands,
            store_var,
            branch,
            text_address,
            size: offset - address,
        };
        trace!("{:05x}: {}", address, instruction);
        Ok(instruction)
    }

    /// Decode the one or two branch bytes at `address`
    pub fn decode_branch(memory: &Memory, address: u32) -> Result<(BranchInfo, u32)> {
        let first = memory.read_byte(address)?;
        let on_true = first & 0x80 != 0;
        if first & 0x40 != 0 {
            // Short form: unsigned 6-bit offset
            return Ok((
                BranchInfo {
                    on_true,
                    offset: (first & 0x3F) as i16,
                },
                1,
            ));
        }
        let second = memory.read_byte(address + 1)?;
        let mut value = (((first & 0x3F) as u16) << 8) | second as u16;
        if value & 0x2000 != 0 {
            // Sign extend from bit 13
            value |= 0xC000;
        }
        Ok((
            BranchInfo {
                on_true,
                offset: value as i16,
            },
            2,
        ))
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.descriptor.mnemonic
    }

    /// Get a human-readable name for the instruction
    pub fn name(&self) -> &'static str {
        self.descriptor.mnemonic.name()
    }

    /// Address of the following instruction
    pub fn next_address(&self) -> u32 {
        self.address + self.size
    }

    /// Raw operand values, for diagnostics
    pub fn raw_operands(&self) -> Vec<u16> {
        self.operands.iter().map(|op| op.raw).collect()
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        write!(f, "{}", self.name())?;

        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " ")?;
            } else {
                write!(f, ", ")?;
            }
            match op.kind {
                OperandType::Variable => write!(f, "V{:02x}", op.raw)?,
                _ => write!(f, "#{:04x}", op.raw)?,
            }
        }

        if let Some(var) = self.store_var {
            write!(f, " -> V{:02x}", var)?;
        }

        if let Some(ref branch) = self.branch {
            write!(
                f,
                " [{}{}]",
                if branch.on_true { "TRUE" } else { "FALSE" },
                match branch.offset {
                    0 => " RFALSE".to_string(),
                    1 => " RTRUE".to_string(),
                    n => format!(" {:+}", n),
                }
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmError;
    use crate::opcode_tables::tables_for;
    use crate::test_utils::{StoryBuilder, CODE_START};

    fn decode(version: u8, code: &[u8]) -> Instruction {
        let builder = StoryBuilder::new(version);
        let at = builder.code_address();
        let memory = builder.code(code).build().unwrap();
        Instruction::decode(&memory, at, tables_for(version), version).unwrap()
    }

    #[test]
    fn test_operand_type_from_bits() {
        assert_eq!(OperandType::from_bits(0b00), OperandType::LargeConstant);
        assert_eq!(OperandType::from_bits(0b01), OperandType::SmallConstant);
        assert_eq!(OperandType::from_bits(0b10), OperandType::Variable);
        assert_eq!(OperandType::from_bits(0b11), OperandType::Omitted);
    }

    #[test]
    fn test_decode_long_form() {
        // je #34, V78 [TRUE RFALSE]
        let inst = decode(3, &[0x21, 0x34, 0x78, 0xC0]);
        assert_eq!(inst.mnemonic(), Mnemonic::Je);
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.operands[0].kind, OperandType::SmallConstant);
        assert_eq!(inst.operands[1].kind, OperandType::Variable);
        assert_eq!(inst.operands[1].raw, 0x78);
        assert_eq!(
            inst.branch,
            Some(BranchInfo {
                on_true: true,
                offset: 0
            })
        );
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn test_decode_short_form() {
        // jump #0034 (large constant)
        let inst = decode(3, &[0x8C, 0x00, 0x34]);
        assert_eq!(inst.mnemonic(), Mnemonic::Jump);
        assert_eq!(inst.operands[0].kind, OperandType::LargeConstant);
        assert_eq!(inst.operands[0].raw, 0x34);
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn test_decode_variable_form() {
        // call #1234, V01, V02, V03 -> sp
        let inst = decode(3, &[0xE0, 0x2A, 0x12, 0x34, 0x01, 0x02, 0x03, 0x00]);
        assert_eq!(inst.mnemonic(), Mnemonic::CallVs);
        let raw: Vec<u16> = inst.raw_operands();
        assert_eq!(raw, vec![0x1234, 0x01, 0x02, 0x03]);
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 8);
    }

    #[test]
    fn test_omitted_type_ends_operand_list() {
        // add #05, #03 -> V10 in VAR form with the last two types omitted
        let inst = decode(3, &[0xD4, 0x5F, 0x05, 0x03, 0x10]);
        assert_eq!(inst.mnemonic(), Mnemonic::Add);
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.store_var, Some(0x10));
    }

    #[test]
    fn test_double_type_byte_calls() {
        // call_vs2 with six small-constant operands
        let inst = decode(
            5,
            &[0xEC, 0x55, 0x5F, 1, 2, 3, 4, 5, 6, 0x00],
        );
        assert_eq!(inst.mnemonic(), Mnemonic::CallVs2);
        assert_eq!(inst.raw_operands(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(inst.store_var, Some(0));
    }

    #[test]
    fn test_extended_prefix_only_from_v5() {
        // log_shift #01, #02 -> sp
        let inst = decode(5, &[0xBE, 0x02, 0x5F, 0x01, 0x02, 0x00]);
        assert_eq!(inst.mnemonic(), Mnemonic::LogShift);
        assert_eq!(inst.size, 6);

        // Before v5 0xBE is an unassigned 0OP
        let inst = decode(3, &[0xBE, 0x02]);
        assert_eq!(inst.mnemonic(), Mnemonic::Unassigned);
        assert_eq!(inst.size, 1);
    }

    #[test]
    fn test_short_branch_offsets_are_unsigned() {
        // jz #00 [FALSE +63]
        let inst = decode(3, &[0x90, 0x00, 0x7F]);
        let branch = inst.branch.unwrap();
        assert!(!branch.on_true);
        assert_eq!(branch.offset, 63);
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn test_long_branch_sign_extension() {
        let memory = StoryBuilder::new(3)
            .code(&[0x80, 0x05, 0xBF, 0xFE, 0x20, 0x00])
            .build()
            .unwrap();
        let (branch, len) = Instruction::decode_branch(&memory, CODE_START).unwrap();
        assert_eq!(branch, BranchInfo { on_true: true, offset: 5 });
        assert_eq!(len, 2);

        let (branch, _) = Instruction::decode_branch(&memory, CODE_START + 2).unwrap();
        assert_eq!(branch, BranchInfo { on_true: true, offset: -2 });

        let (branch, _) = Instruction::decode_branch(&memory, CODE_START + 4).unwrap();
        assert_eq!(branch, BranchInfo { on_true: false, offset: -8192 });
    }

    #[test]
    fn test_inline_text_is_skipped() {
        let builder = StoryBuilder::new(3);
        let at = builder.code_address();
        let words = crate::text::encode_string("hello", &crate::text::Alphabets::standard());
        let mut code = vec![0xB2];
        for w in &words {
            code.extend_from_slice(&w.to_be_bytes());
        }
        code.push(0xBA);
        let memory = builder.code(&code).build().unwrap();
        let inst = Instruction::decode(&memory, at, tables_for(3), 3).unwrap();
        assert_eq!(inst.mnemonic(), Mnemonic::Print);
        assert_eq!(inst.text_address, Some(at + 1));
        assert_eq!(inst.size, 1 + words.len() as u32 * 2);
        let next = Instruction::decode(&memory, inst.next_address(), tables_for(3), 3).unwrap();
        assert_eq!(next.mnemonic(), Mnemonic::Quit);
    }

    #[test]
    fn test_decode_past_end_is_memory_fault() {
        let memory = StoryBuilder::new(3).build().unwrap();
        let end = memory.len() as u32 - 1;
        let mut bytes = memory.bytes().to_vec();
        bytes[end as usize] = 0x8C;
        let memory = Memory::load(bytes).unwrap();
        let err = Instruction::decode(&memory, end, tables_for(3), 3).unwrap_err();
        assert!(matches!(err, VmError::MemoryFault { .. }));
    }

    #[test]
    fn test_display_format() {
        let inst = decode(3, &[0x14, 0x05, 0x03, 0x10]);
        assert_eq!(inst.to_string(), "add #0005, #0003 -> V10");
    }
}
