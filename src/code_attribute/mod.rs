mod types;

pub use self::types::*;

use std::io::Cursor;

use binrw::{BinRead, BinResult, BinWrite};

/// Decode a raw code array into `(offset, instruction)` pairs.
pub fn decode_code(code: &[u8]) -> BinResult<Vec<(u32, Instruction)>> {
    let mut cursor = Cursor::new(code);
    let mut instructions = Vec::new();
    while (cursor.position() as usize) < code.len() {
        let address = cursor.position() as u32;
        let instruction = Instruction::read_args(&mut cursor, (address,))?;
        instructions.push((address, instruction));
    }
    Ok(instructions)
}

/// Encode instructions laid out back to back from offset 0.
pub fn encode_code<'a, I>(instructions: I) -> BinResult<Vec<u8>>
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut cursor = Cursor::new(Vec::new());
    for instruction in instructions {
        let address = cursor.position() as u32;
        instruction.write_args(&mut cursor, (address,))?;
    }
    Ok(cursor.into_inner())
}

/// Why a branch could not be moved to its new position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelocationError {
    /// The old target is not the start of any instruction.
    UnmappedTarget { target: i64 },
    /// The new displacement does not fit the operand width.
    Overflow { displacement: i64 },
}

impl Instruction {
    /// Returns the byte size of this instruction when placed at `address`.
    pub fn byte_size(&self, address: u32) -> u32 {
        use Instruction::*;
        match self {
            Bipush(_) | Ldc(_) | Newarray(_) | Ret(_) => 2,
            Iload(_) | Lload(_) | Fload(_) | Dload(_) | Aload(_) => 2,
            Istore(_) | Lstore(_) | Fstore(_) | Dstore(_) | Astore(_) => 2,
            Sipush(_) | LdcW(_) | Ldc2W(_) | Iinc { .. } => 3,
            Getstatic(_) | Putstatic(_) | Getfield(_) | Putfield(_) => 3,
            Invokevirtual(_) | Invokespecial(_) | Invokestatic(_) => 3,
            New(_) | Anewarray(_) | Checkcast(_) | Instanceof(_) => 3,
            Ifeq(_) | Ifne(_) | Iflt(_) | Ifge(_) | Ifgt(_) | Ifle(_) => 3,
            IfIcmpeq(_) | IfIcmpne(_) | IfIcmplt(_) | IfIcmpge(_) | IfIcmpgt(_) | IfIcmple(_) => 3,
            IfAcmpeq(_) | IfAcmpne(_) | Ifnull(_) | Ifnonnull(_) | Goto(_) | Jsr(_) => 3,
            Multianewarray { .. } => 4,
            Invokeinterface { .. } | Invokedynamic { .. } | GotoW(_) | JsrW(_) => 5,
            Wide(WideInstruction::Iinc { .. }) => 6,
            Wide(_) => 4,
            Tableswitch { offsets, .. } => {
                let padding = (4 - (address + 1) % 4) % 4;
                // 1 (opcode) + padding + 4 (default) + 4 (low) + 4 (high) + 4 per offset
                1 + padding + 12 + 4 * offsets.len() as u32
            }
            Lookupswitch { pairs, .. } => {
                let padding = (4 - (address + 1) % 4) % 4;
                // 1 (opcode) + padding + 4 (default) + 4 (npairs) + 8 per pair
                1 + padding + 8 + 8 * pairs.len() as u32
            }
            _ => 1,
        }
    }

    /// True if this instruction carries relative branch operands.
    pub fn is_branch(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            Ifeq(_)
                | Ifne(_)
                | Iflt(_)
                | Ifge(_)
                | Ifgt(_)
                | Ifle(_)
                | IfIcmpeq(_)
                | IfIcmpne(_)
                | IfIcmplt(_)
                | IfIcmpge(_)
                | IfIcmpgt(_)
                | IfIcmple(_)
                | IfAcmpeq(_)
                | IfAcmpne(_)
                | Ifnull(_)
                | Ifnonnull(_)
                | Goto(_)
                | Jsr(_)
                | GotoW(_)
                | JsrW(_)
                | Tableswitch { .. }
                | Lookupswitch { .. }
        )
    }

    /// Rewrite every branch operand of an instruction that moved from
    /// `old_address` to `new_address`. `map` translates old absolute offsets
    /// to new ones.
    pub fn relocate_branches<F>(
        &mut self,
        old_address: u32,
        new_address: u32,
        map: F,
    ) -> Result<(), RelocationError>
    where
        F: Fn(u32) -> Option<u32>,
    {
        use Instruction::*;

        let retarget = |offset: i64| -> Result<i64, RelocationError> {
            let target = i64::from(old_address) + offset;
            let mapped = u32::try_from(target)
                .ok()
                .and_then(&map)
                .ok_or(RelocationError::UnmappedTarget { target })?;
            Ok(i64::from(mapped) - i64::from(new_address))
        };
        let narrow = |displacement: i64| {
            i16::try_from(displacement).map_err(|_| RelocationError::Overflow { displacement })
        };
        let wide = |displacement: i64| {
            i32::try_from(displacement).map_err(|_| RelocationError::Overflow { displacement })
        };

        match self {
            Ifeq(off) | Ifne(off) | Iflt(off) | Ifge(off) | Ifgt(off) | Ifle(off)
            | IfIcmpeq(off) | IfIcmpne(off) | IfIcmplt(off) | IfIcmpge(off) | IfIcmpgt(off)
            | IfIcmple(off) | IfAcmpeq(off) | IfAcmpne(off) | Ifnull(off) | Ifnonnull(off)
            | Goto(off) | Jsr(off) => {
                *off = narrow(retarget(i64::from(*off))?)?;
            }
            GotoW(off) | JsrW(off) => {
                *off = wide(retarget(i64::from(*off))?)?;
            }
            Tableswitch {
                default, offsets, ..
            } => {
                *default = wide(retarget(i64::from(*default))?)?;
                for off in offsets.iter_mut() {
                    *off = wide(retarget(i64::from(*off))?)?;
                }
            }
            Lookupswitch { default, pairs, .. } => {
                *default = wide(retarget(i64::from(*default))?)?;
                for (_, off) in pairs.iter_mut() {
                    *off = wide(retarget(i64::from(*off))?)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `aload` for a local slot, picking the shortest encoding.
    pub fn aload(slot: u16) -> Instruction {
        match slot {
            0 => Instruction::Aload0,
            1 => Instruction::Aload1,
            2 => Instruction::Aload2,
            3 => Instruction::Aload3,
            s if s <= u8::MAX as u16 => Instruction::Aload(s as u8),
            s => Instruction::Wide(WideInstruction::Aload(s)),
        }
    }

    /// `astore` for a local slot, picking the shortest encoding.
    pub fn astore(slot: u16) -> Instruction {
        match slot {
            0 => Instruction::Astore0,
            1 => Instruction::Astore1,
            2 => Instruction::Astore2,
            3 => Instruction::Astore3,
            s if s <= u8::MAX as u16 => Instruction::Astore(s as u8),
            s => Instruction::Wide(WideInstruction::Astore(s)),
        }
    }

    /// Smallest instruction that pushes the int constant `value`.
    pub fn push_int(value: i32) -> Instruction {
        match value {
            -1 => Instruction::Iconstm1,
            0 => Instruction::Iconst0,
            1 => Instruction::Iconst1,
            2 => Instruction::Iconst2,
            3 => Instruction::Iconst3,
            4 => Instruction::Iconst4,
            5 => Instruction::Iconst5,
            v if i8::try_from(v).is_ok() => Instruction::Bipush(v as i8),
            v => Instruction::Sipush(v as i16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_and_wide() {
        let code = [0x11, 0xff, 0xfe, 0xc4, 0x15, 0xaa, 0xbb, 0xb1];
        let decoded = decode_code(&code).unwrap();
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::Sipush(-2)),
                (3, Instruction::Wide(WideInstruction::Iload(0xaabb))),
                (7, Instruction::Return),
            ]
        );
        assert_eq!(decoded[1].1.byte_size(3), 4);
    }

    #[test]
    fn tableswitch_alignment_depends_on_address() {
        // nop, nop, nop, tableswitch (aligned: no padding)
        let aligned = [
            0x00, 0x00, 0x00, 0xaa, 0, 0, 0, 10, 0, 0, 0, 20, 0, 0, 0, 21, 0, 0, 0, 30, 0, 0, 0,
            31,
        ];
        let decoded = decode_code(&aligned).unwrap();
        let expected = Instruction::Tableswitch {
            default: 10,
            low: 20,
            high: 21,
            offsets: vec![30, 31],
        };
        assert_eq!(decoded[3], (3, expected.clone()));
        assert_eq!(expected.byte_size(3), 21);
        assert_eq!(expected.byte_size(0), 24);

        // Re-encoding at offset 0 inserts three padding bytes.
        let encoded = encode_code([&expected]).unwrap();
        assert_eq!(encoded.len(), 24);
        assert_eq!(&encoded[..4], &[0xaa, 0, 0, 0]);
    }

    #[test]
    fn tableswitch_with_inverted_bounds_is_rejected() {
        // tableswitch at 0: three padding bytes, default 0, low 5, high 3
        let code = [0xaa, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 3, 0xb1];
        assert!(decode_code(&code).is_err());

        let inverted = Instruction::Tableswitch {
            default: 0,
            low: 5,
            high: 3,
            offsets: Vec::new(),
        };
        assert_eq!(inverted.byte_size(0), 16);
    }

    #[test]
    fn round_trips_code_array() {
        let code = [
            0x2a, 0xb7, 0x00, 0x01, 0x03, 0x3c, 0x1b, 0x10, 0x0a, 0xa2, 0x00, 0x09, 0x84, 0x01,
            0x01, 0xa7, 0xff, 0xf7, 0xb1,
        ];
        let decoded = decode_code(&code).unwrap();
        let encoded = encode_code(decoded.iter().map(|(_, i)| i)).unwrap();
        assert_eq!(encoded, code);
        for (address, instruction) in &decoded {
            let next = decoded
                .iter()
                .find(|(a, _)| a > address)
                .map(|(a, _)| *a)
                .unwrap_or(code.len() as u32);
            assert_eq!(instruction.byte_size(*address), next - address);
        }
    }

    #[test]
    fn relocates_backward_goto() {
        // goto at 15 jumping back to 6; the code in between grew by 10 bytes.
        let mut goto = Instruction::Goto(-9);
        let map = |old: u32| Some(if old <= 6 { old } else { old + 10 });
        goto.relocate_branches(15, 25, map).unwrap();
        assert_eq!(goto, Instruction::Goto(-19));
    }

    #[test]
    fn relocation_reports_overflow_and_unmapped_targets() {
        let mut goto = Instruction::Goto(3);
        let err = goto
            .relocate_branches(0, 0, |old| Some(old + 40_000))
            .unwrap_err();
        assert_eq!(err, RelocationError::Overflow { displacement: 40_003 });

        let mut ifeq = Instruction::Ifeq(4);
        let err = ifeq.relocate_branches(0, 0, |_| None).unwrap_err();
        assert_eq!(err, RelocationError::UnmappedTarget { target: 4 });
    }

    #[test]
    fn local_slot_encodings() {
        assert_eq!(Instruction::astore(2), Instruction::Astore2);
        assert_eq!(Instruction::aload(17), Instruction::Aload(17));
        assert_eq!(
            Instruction::astore(300),
            Instruction::Wide(WideInstruction::Astore(300))
        );
        assert_eq!(Instruction::push_int(11), Instruction::Bipush(11));
        assert_eq!(Instruction::push_int(4), Instruction::Iconst4);
        assert_eq!(Instruction::push_int(1000), Instruction::Sipush(1000));
    }
}
