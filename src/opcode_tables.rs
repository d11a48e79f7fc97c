//! Version-selected opcode descriptor tables.
//!
//! `build_tables` starts from the version 1 baseline, applies the overrides
//! for versions 4, 5 and 6, then replicates each 2OP descriptor across its
//! long-form and VAR-form encodings and each 1OP descriptor across its three
//! operand-type encodings. Unassigned slots hold an `Unassigned` descriptor
//! that decodes and executes as a no-op.

use log::debug;

/// Operand encoding of an instruction, as fixed by its opcode byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeForm {
    Op0,
    Op1,
    Op2,
    Var,
    Ext,
}

/// Symbolic identity of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Unassigned,
    // 2OP
    Je,
    Jl,
    Jg,
    DecChk,
    IncChk,
    Jin,
    Test,
    Or,
    And,
    TestAttr,
    SetAttr,
    ClearAttr,
    Store,
    InsertObj,
    Loadw,
    Loadb,
    GetProp,
    GetPropAddr,
    GetNextProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Call2s,
    Call2n,
    SetColour,
    Throw,
    // 1OP
    Jz,
    GetSibling,
    GetChild,
    GetParent,
    GetPropLen,
    Inc,
    Dec,
    PrintAddr,
    Call1s,
    RemoveObj,
    PrintObj,
    Ret,
    Jump,
    PrintPaddr,
    Load,
    Not,
    Call1n,
    // 0OP
    Rtrue,
    Rfalse,
    Print,
    PrintRet,
    Nop,
    Save,
    Restore,
    Restart,
    RetPopped,
    Pop,
    Catch,
    Quit,
    NewLine,
    ShowStatus,
    Verify,
    Piracy,
    // VAR
    CallVs,
    Storew,
    Storeb,
    PutProp,
    Sread,
    Aread,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    CallVs2,
    EraseWindow,
    EraseLine,
    SetCursor,
    GetCursor,
    SetTextStyle,
    BufferMode,
    OutputStream,
    InputStream,
    SoundEffect,
    ReadChar,
    ScanTable,
    CallVn,
    CallVn2,
    Tokenise,
    EncodeText,
    CopyTable,
    PrintTable,
    CheckArgCount,
    // EXT
    LogShift,
    ArtShift,
    SetFont,
    DrawPicture,
    PictureData,
    ErasePicture,
    SetMargins,
    SaveUndo,
    RestoreUndo,
    PrintUnicode,
    CheckUnicode,
    SetTrueColour,
    MoveWindow,
    WindowSize,
    WindowStyle,
    GetWindProp,
    ScrollWindow,
    PopStack,
    ReadMouse,
    MouseWindow,
    PushStack,
    PutWindProp,
    PrintForm,
    MakeMenu,
    PictureTable,
    BufferScreen,
}

impl Mnemonic {
    pub fn name(&self) -> &'static str {
        use Mnemonic::*;
        match self {
            Unassigned => "unassigned",
            Je => "je",
            Jl => "jl",
            Jg => "jg",
            DecChk => "dec_chk",
            IncChk => "inc_chk",
            Jin => "jin",
            Test => "test",
            Or => "or",
            And => "and",
            TestAttr => "test_attr",
            SetAttr => "set_attr",
            ClearAttr => "clear_attr",
            Store => "store",
            InsertObj => "insert_obj",
            Loadw => "loadw",
            Loadb => "loadb",
            GetProp => "get_prop",
            GetPropAddr => "get_prop_addr",
            GetNextProp => "get_next_prop",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Div => "div",
            Mod => "mod",
            Call2s => "call_2s",
            Call2n => "call_2n",
            SetColour => "set_colour",
            Throw => "throw",
            Jz => "jz",
            GetSibling => "get_sibling",
            GetChild => "get_child",
            GetParent => "get_parent",
            GetPropLen => "get_prop_len",
            Inc => "inc",
            Dec => "dec",
            PrintAddr => "print_addr",
            Call1s => "call_1s",
            RemoveObj => "remove_obj",
            PrintObj => "print_obj",
            Ret => "ret",
            Jump => "jump",
            PrintPaddr => "print_paddr",
            Load => "load",
            Not => "not",
            Call1n => "call_1n",
            Rtrue => "rtrue",
            Rfalse => "rfalse",
            Print => "print",
            PrintRet => "print_ret",
            Nop => "nop",
            Save => "save",
            Restore => "restore",
            Restart => "restart",
            RetPopped => "ret_popped",
            Pop => "pop",
            Catch => "catch",
            Quit => "quit",
            NewLine => "new_line",
            ShowStatus => "show_status",
            Verify => "verify",
            Piracy => "piracy",
            CallVs => "call_vs",
            Storew => "storew",
            Storeb => "storeb",
            PutProp => "put_prop",
            Sread => "sread",
            Aread => "aread",
            PrintChar => "print_char",
            PrintNum => "print_num",
            Random => "random",
            Push => "push",
            Pull => "pull",
            SplitWindow => "split_window",
            SetWindow => "set_window",
            CallVs2 => "call_vs2",
            EraseWindow => "erase_window",
            EraseLine => "erase_line",
            SetCursor => "set_cursor",
            GetCursor => "get_cursor",
            SetTextStyle => "set_text_style",
            BufferMode => "buffer_mode",
            OutputStream => "output_stream",
            InputStream => "input_stream",
            SoundEffect => "sound_effect",
            ReadChar => "read_char",
            ScanTable => "scan_table",
            CallVn => "call_vn",
            CallVn2 => "call_vn2",
            Tokenise => "tokenise",
            EncodeText => "encode_text",
            CopyTable => "copy_table",
            PrintTable => "print_table",
            CheckArgCount => "check_arg_count",
            LogShift => "log_shift",
            ArtShift => "art_shift",
            SetFont => "set_font",
            DrawPicture => "draw_picture",
            PictureData => "picture_data",
            ErasePicture => "erase_picture",
            SetMargins => "set_margins",
            SaveUndo => "save_undo",
            RestoreUndo => "restore_undo",
            PrintUnicode => "print_unicode",
            CheckUnicode => "check_unicode",
            SetTrueColour => "set_true_colour",
            MoveWindow => "move_window",
            WindowSize => "window_size",
            WindowStyle => "window_style",
            GetWindProp => "get_wind_prop",
            ScrollWindow => "scroll_window",
            PopStack => "pop_stack",
            ReadMouse => "read_mouse",
            MouseWindow => "mouse_window",
            PushStack => "push_stack",
            PutWindProp => "put_wind_prop",
            PrintForm => "print_form",
            MakeMenu => "make_menu",
            PictureTable => "picture_table",
            BufferScreen => "buffer_screen",
        }
    }
}

/// Static description of one opcode slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub form: OpcodeForm,
    pub mnemonic: Mnemonic,
    /// Raw opcode byte (or extended opcode byte for EXT)
    pub raw: u8,
    /// Lowest machine version in which this encoding means `mnemonic`
    pub min_version: u8,
    pub store: bool,
    pub branch: bool,
}

impl Descriptor {
    pub fn is_assigned(&self) -> bool {
        self.mnemonic != Mnemonic::Unassigned
    }

    /// Opcode number within its operand-count group, as printed in
    /// disassembly (`2OP:0x14`).
    pub fn number(&self) -> u8 {
        match self.form {
            OpcodeForm::Op2 | OpcodeForm::Var | OpcodeForm::Op0 => self.raw & 0x1F,
            OpcodeForm::Op1 => self.raw & 0x0F,
            OpcodeForm::Ext => self.raw,
        }
    }
}

/// Normal and extended lookup tables for one machine version
#[derive(Debug, Clone)]
pub struct InstructionTables {
    pub version: u8,
    pub normal: [Descriptor; 256],
    pub extended: [Descriptor; 256],
}

impl InstructionTables {
    pub fn normal(&self, opcode: u8) -> &Descriptor {
        &self.normal[opcode as usize]
    }

    pub fn extended(&self, opcode: u8) -> &Descriptor {
        &self.extended[opcode as usize]
    }
}

const fn op(
    form: OpcodeForm,
    mnemonic: Mnemonic,
    raw: u8,
    min_version: u8,
    store: bool,
    branch: bool,
) -> Descriptor {
    Descriptor {
        form,
        mnemonic,
        raw,
        min_version,
        store,
        branch,
    }
}

fn unassigned(form: OpcodeForm, raw: u8) -> Descriptor {
    op(form, Mnemonic::Unassigned, raw, 1, false, false)
}

/// Operand encoding implied by a normal opcode byte's position
fn form_of(raw: u8) -> OpcodeForm {
    match raw {
        0x00..=0x7F => OpcodeForm::Op2,
        0x80..=0xAF => OpcodeForm::Op1,
        0xB0..=0xBF => OpcodeForm::Op0,
        _ => OpcodeForm::Var,
    }
}

use Mnemonic::*;
use OpcodeForm::*;

/// Version 1 baseline, canonical encodings only.
/// (form, mnemonic, raw, min_version, store, branch)
const BASELINE: &[Descriptor] = &[
    // 2OP, long form with two small constants
    op(Op2, Je, 0x01, 1, false, true),
    op(Op2, Jl, 0x02, 1, false, true),
    op(Op2, Jg, 0x03, 1, false, true),
    op(Op2, DecChk, 0x04, 1, false, true),
    op(Op2, IncChk, 0x05, 1, false, true),
    op(Op2, Jin, 0x06, 1, false, true),
    op(Op2, Test, 0x07, 1, false, true),
    op(Op2, Or, 0x08, 1, true, false),
    op(Op2, And, 0x09, 1, true, false),
    op(Op2, TestAttr, 0x0A, 1, false, true),
    op(Op2, SetAttr, 0x0B, 1, false, false),
    op(Op2, ClearAttr, 0x0C, 1, false, false),
    op(Op2, Store, 0x0D, 1, false, false),
    op(Op2, InsertObj, 0x0E, 1, false, false),
    op(Op2, Loadw, 0x0F, 1, true, false),
    op(Op2, Loadb, 0x10, 1, true, false),
    op(Op2, GetProp, 0x11, 1, true, false),
    op(Op2, GetPropAddr, 0x12, 1, true, false),
    op(Op2, GetNextProp, 0x13, 1, true, false),
    op(Op2, Add, 0x14, 1, true, false),
    op(Op2, Sub, 0x15, 1, true, false),
    op(Op2, Mul, 0x16, 1, true, false),
    op(Op2, Div, 0x17, 1, true, false),
    op(Op2, Mod, 0x18, 1, true, false),
    op(Op2, Call2s, 0x19, 4, true, false),
    op(Op2, Call2n, 0x1A, 5, false, false),
    op(Op2, SetColour, 0x1B, 5, false, false),
    op(Op2, Throw, 0x1C, 5, false, false),
    // 1OP, large constant operand
    op(Op1, Jz, 0x80, 1, false, true),
    op(Op1, GetSibling, 0x81, 1, true, true),
    op(Op1, GetChild, 0x82, 1, true, true),
    op(Op1, GetParent, 0x83, 1, true, false),
    op(Op1, GetPropLen, 0x84, 1, true, false),
    op(Op1, Inc, 0x85, 1, false, false),
    op(Op1, Dec, 0x86, 1, false, false),
    op(Op1, PrintAddr, 0x87, 1, false, false),
    op(Op1, Call1s, 0x88, 4, true, false),
    op(Op1, RemoveObj, 0x89, 1, false, false),
    op(Op1, PrintObj, 0x8A, 1, false, false),
    op(Op1, Ret, 0x8B, 1, false, false),
    op(Op1, Jump, 0x8C, 1, false, false),
    op(Op1, PrintPaddr, 0x8D, 1, false, false),
    op(Op1, Load, 0x8E, 1, true, false),
    op(Op1, Not, 0x8F, 1, true, false),
    // 0OP
    op(Op0, Rtrue, 0xB0, 1, false, false),
    op(Op0, Rfalse, 0xB1, 1, false, false),
    op(Op0, Print, 0xB2, 1, false, false),
    op(Op0, PrintRet, 0xB3, 1, false, false),
    op(Op0, Nop, 0xB4, 1, false, false),
    op(Op0, Save, 0xB5, 1, false, true),
    op(Op0, Restore, 0xB6, 1, false, true),
    op(Op0, Restart, 0xB7, 1, false, false),
    op(Op0, RetPopped, 0xB8, 1, false, false),
    op(Op0, Pop, 0xB9, 1, false, false),
    op(Op0, Quit, 0xBA, 1, false, false),
    op(Op0, NewLine, 0xBB, 1, false, false),
    op(Op0, ShowStatus, 0xBC, 3, false, false),
    op(Op0, Verify, 0xBD, 3, false, true),
    op(Op0, Piracy, 0xBF, 5, false, true),
    // VAR
    op(Var, CallVs, 0xE0, 1, true, false),
    op(Var, Storew, 0xE1, 1, false, false),
    op(Var, Storeb, 0xE2, 1, false, false),
    op(Var, PutProp, 0xE3, 1, false, false),
    op(Var, Sread, 0xE4, 1, false, false),
    op(Var, PrintChar, 0xE5, 1, false, false),
    op(Var, PrintNum, 0xE6, 1, false, false),
    op(Var, Random, 0xE7, 1, true, false),
    op(Var, Push, 0xE8, 1, false, false),
    op(Var, Pull, 0xE9, 1, false, false),
    op(Var, SplitWindow, 0xEA, 3, false, false),
    op(Var, SetWindow, 0xEB, 3, false, false),
    op(Var, CallVs2, 0xEC, 4, true, false),
    op(Var, EraseWindow, 0xED, 4, false, false),
    op(Var, EraseLine, 0xEE, 4, false, false),
    op(Var, SetCursor, 0xEF, 4, false, false),
    op(Var, GetCursor, 0xF0, 4, false, false),
    op(Var, SetTextStyle, 0xF1, 4, false, false),
    op(Var, BufferMode, 0xF2, 4, false, false),
    op(Var, OutputStream, 0xF3, 3, false, false),
    op(Var, InputStream, 0xF4, 3, false, false),
    op(Var, SoundEffect, 0xF5, 3, false, false),
    op(Var, ReadChar, 0xF6, 4, true, false),
    op(Var, ScanTable, 0xF7, 4, true, true),
    op(Var, Not, 0xF8, 5, true, false),
    op(Var, CallVn, 0xF9, 5, false, false),
    op(Var, CallVn2, 0xFA, 5, false, false),
    op(Var, Tokenise, 0xFB, 5, false, false),
    op(Var, EncodeText, 0xFC, 5, false, false),
    op(Var, CopyTable, 0xFD, 5, false, false),
    op(Var, PrintTable, 0xFE, 5, false, false),
    op(Var, CheckArgCount, 0xFF, 5, false, true),
];

const EXTENDED_BASELINE: &[Descriptor] = &[
    op(Ext, Save, 0x00, 5, true, false),
    op(Ext, Restore, 0x01, 5, true, false),
    op(Ext, LogShift, 0x02, 5, true, false),
    op(Ext, ArtShift, 0x03, 5, true, false),
    op(Ext, SetFont, 0x04, 5, true, false),
    op(Ext, DrawPicture, 0x05, 6, false, false),
    op(Ext, PictureData, 0x06, 6, false, true),
    op(Ext, ErasePicture, 0x07, 6, false, false),
    op(Ext, SetMargins, 0x08, 6, false, false),
    op(Ext, SaveUndo, 0x09, 5, true, false),
    op(Ext, RestoreUndo, 0x0A, 5, true, false),
    op(Ext, PrintUnicode, 0x0B, 5, false, false),
    op(Ext, CheckUnicode, 0x0C, 5, true, false),
    op(Ext, SetTrueColour, 0x0D, 5, false, false),
    op(Ext, MoveWindow, 0x10, 6, false, false),
    op(Ext, WindowSize, 0x11, 6, false, false),
    op(Ext, WindowStyle, 0x12, 6, false, false),
    op(Ext, GetWindProp, 0x13, 6, true, false),
    op(Ext, ScrollWindow, 0x14, 6, false, false),
    op(Ext, PopStack, 0x15, 6, false, false),
    op(Ext, ReadMouse, 0x16, 6, false, false),
    op(Ext, MouseWindow, 0x17, 6, false, false),
    op(Ext, PushStack, 0x18, 6, false, true),
    op(Ext, PutWindProp, 0x19, 6, false, false),
    op(Ext, PrintForm, 0x1A, 6, false, false),
    op(Ext, MakeMenu, 0x1B, 6, false, true),
    op(Ext, PictureTable, 0x1C, 6, false, false),
    op(Ext, BufferScreen, 0x1D, 6, true, false),
];

/// Overrides keyed by the first version they apply to, applied in order.
const OVERRIDES: &[(u8, Descriptor)] = &[
    // save/restore stop branching and store a result
    (4, op(Op0, Save, 0xB5, 4, true, false)),
    (4, op(Op0, Restore, 0xB6, 4, true, false)),
    (5, op(Op1, Call1n, 0x8F, 5, false, false)),
    (5, op(Op0, Catch, 0xB9, 5, true, false)),
    (5, op(Var, Aread, 0xE4, 5, true, false)),
    // pull gains an optional stack operand and stores its result
    (6, op(Var, Pull, 0xE9, 6, true, false)),
];

/// Build both lookup tables for `version`.
pub fn build_tables(version: u8) -> InstructionTables {
    let mut normal = [unassigned(Op2, 0); 256];
    for (raw, slot) in normal.iter_mut().enumerate() {
        *slot = unassigned(form_of(raw as u8), raw as u8);
    }
    let mut extended = [unassigned(Ext, 0); 256];
    for (raw, slot) in extended.iter_mut().enumerate() {
        *slot = unassigned(Ext, raw as u8);
    }

    for d in BASELINE {
        normal[d.raw as usize] = *d;
    }
    for d in EXTENDED_BASELINE {
        extended[d.raw as usize] = *d;
    }

    for (since, d) in OVERRIDES {
        if version >= *since {
            normal[d.raw as usize] = *d;
        }
    }

    // 2OP: 0x00-0x1F replicate to the other three long forms and to VAR form
    for k in 0..0x20usize {
        let canonical = normal[k];
        for base in [0x20usize, 0x40, 0x60] {
            normal[base + k] = Descriptor {
                raw: (base + k) as u8,
                ..canonical
            };
        }
        normal[0xC0 + k] = Descriptor {
            raw: (0xC0 + k) as u8,
            form: Var,
            ..canonical
        };
    }

    // 1OP: large constant encoding replicates to small constant and variable
    for k in 0..0x10usize {
        let canonical = normal[0x80 + k];
        for base in [0x90usize, 0xA0] {
            normal[base + k] = Descriptor {
                raw: (base + k) as u8,
                ..canonical
            };
        }
    }

    debug!("Built instruction tables for version {}", version);
    InstructionTables {
        version,
        normal,
        extended,
    }
}

lazy_static! {
    static ref TABLES: Vec<InstructionTables> = (0..=8).map(build_tables).collect();
}

/// Cached tables for `version` (clamped to 1..=8).
pub fn tables_for(version: u8) -> &'static InstructionTables {
    &TABLES[version.clamp(1, 8) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_encodings_share_a_descriptor() {
        for version in 1..=8 {
            let tables = build_tables(version);
            for k in 0..32u8 {
                let canonical = tables.normal(k);
                for raw in [k + 32, k + 64, k + 96, k + 192] {
                    let d = tables.normal(raw);
                    assert_eq!(d.raw, raw);
                    assert_eq!(d.mnemonic, canonical.mnemonic, "v{} raw {:02x}", version, raw);
                    assert_eq!(d.min_version, canonical.min_version);
                    assert_eq!(d.store, canonical.store);
                    assert_eq!(d.branch, canonical.branch);
                }
                assert_eq!(tables.normal(k + 192).form, OpcodeForm::Var);
                assert_eq!(tables.normal(k + 96).form, OpcodeForm::Op2);
            }
        }
    }

    #[test]
    fn test_one_op_encodings_share_a_descriptor() {
        let tables = build_tables(3);
        for k in 0..16u8 {
            let canonical = *tables.normal(0x80 + k);
            for raw in [0x90 + k, 0xA0 + k] {
                let d = tables.normal(raw);
                assert_eq!(Descriptor { raw, ..canonical }, *d);
            }
        }
    }

    #[test]
    fn test_version_overrides() {
        let v3 = build_tables(3);
        let v4 = build_tables(4);
        let v5 = build_tables(5);
        let v6 = build_tables(6);

        assert!(v3.normal(0xB5).branch && !v3.normal(0xB5).store);
        assert!(v4.normal(0xB5).store && !v4.normal(0xB5).branch);

        assert_eq!(v4.normal(0x8F).mnemonic, Mnemonic::Not);
        assert_eq!(v5.normal(0x8F).mnemonic, Mnemonic::Call1n);
        assert_eq!(v5.normal(0xAF).mnemonic, Mnemonic::Call1n);

        assert_eq!(v4.normal(0xB9).mnemonic, Mnemonic::Pop);
        assert_eq!(v5.normal(0xB9).mnemonic, Mnemonic::Catch);
        assert!(v5.normal(0xB9).store);

        assert_eq!(v4.normal(0xE4).mnemonic, Mnemonic::Sread);
        assert!(!v4.normal(0xE4).store);
        assert_eq!(v5.normal(0xE4).mnemonic, Mnemonic::Aread);
        assert!(v5.normal(0xE4).store);

        assert!(!v5.normal(0xE9).store);
        assert!(v6.normal(0xE9).store);
    }

    #[test]
    fn test_unassigned_slots_are_tolerated() {
        let tables = build_tables(5);
        assert!(!tables.normal(0x00).is_assigned());
        assert!(!tables.normal(0x1F).is_assigned());
        assert!(!tables.normal(0xBE).is_assigned());
        assert_eq!(tables.normal(0xBE).form, OpcodeForm::Op0);
        assert!(!tables.extended(0x0E).is_assigned());
        assert!(!tables.extended(0xFF).is_assigned());
    }

    #[test]
    fn test_store_and_branch_flags() {
        let tables = build_tables(5);
        // print_addr neither stores nor branches; inc/dec do neither either
        assert!(!tables.normal(0x87).store);
        assert!(!tables.normal(0x85).branch && !tables.normal(0x86).branch);
        // get_sibling and get_child both store and branch
        assert!(tables.normal(0x81).store && tables.normal(0x81).branch);
        assert!(tables.extended(0x0C).store);
        assert!(tables.normal(0xF7).store && tables.normal(0xF7).branch);
    }

    #[test]
    fn test_cached_tables_match_fresh_build() {
        let cached = tables_for(5);
        let fresh = build_tables(5);
        assert_eq!(cached.version, 5);
        assert_eq!(cached.normal[..], fresh.normal[..]);
        assert_eq!(tables_for(0).version, 1);
    }
}
