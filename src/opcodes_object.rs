/// Object system operations for Z-Machine interpreter
///
/// This module handles all object-related operations including:
/// - Object hierarchy operations (get_sibling, get_child, get_parent, insert_obj, remove_obj)
/// - Object properties (get_prop, put_prop, get_prop_addr, get_next_prop, get_prop_len)
/// - Object attributes (test_attr, set_attr, clear_attr)
/// - Object relationships (jin - test if object is inside another)
/// - Object display (print_obj - print object's short name)
///
/// Object 0 means "nothing". Stories do ask about it, so reads on object 0
/// give 0 or false and changes to it are logged and skipped.
use crate::error::{Result, VmError};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Mnemonic;
use log::{debug, warn};

impl Interpreter {
    /// Handle object system opcodes
    pub fn execute_object_op(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> Result<ExecutionResult> {
        let obj = operands.first().copied().unwrap_or(0);
        let b = operands.get(1).copied().unwrap_or(0);
        let objects = self.vm.objects();

        if obj == 0 && inst.mnemonic() != Mnemonic::GetPropLen {
            return self.object_zero(inst);
        }

        match inst.mnemonic() {
            // ---- 1OP OBJECT OPERATIONS ----

            // 1OP:0x01 - get_sibling
            Mnemonic::GetSibling => {
                let sibling = objects.get_sibling(&self.vm.memory, obj)?;
                self.store_result(inst, sibling)?;
                self.do_branch(inst, sibling != 0)
            }

            // 1OP:0x02 - get_child
            Mnemonic::GetChild => {
                let child = objects.get_child(&self.vm.memory, obj)?;
                self.store_result(inst, child)?;
                self.do_branch(inst, child != 0)
            }

            // 1OP:0x03 - get_parent
            Mnemonic::GetParent => {
                let parent = objects.get_parent(&self.vm.memory, obj)?;
                self.store_result(inst, parent)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x04 - get_prop_len (operand is a property data address)
            Mnemonic::GetPropLen => {
                let len = objects.get_property_length(&self.vm.memory, obj as u32)?;
                self.store_result(inst, len)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x09 - remove_obj
            Mnemonic::RemoveObj => {
                debug!("remove_obj {}", obj);
                objects.remove_object(&mut self.vm.memory, obj)?;
                Ok(ExecutionResult::Continue)
            }

            // 1OP:0x0A - print_obj
            Mnemonic::PrintObj => {
                let name = match objects.short_name_address(&self.vm.memory, obj)? {
                    Some(address) => self.vm.text()?.decode(address)?.0,
                    None => String::new(),
                };
                self.output_text(&name)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- 2OP OBJECT OPERATIONS ----

            // 2OP:0x06 - jin
            Mnemonic::Jin => {
                let parent = objects.get_parent(&self.vm.memory, obj)?;
                self.do_branch(inst, parent == b)
            }

            // 2OP:0x0A - test_attr
            Mnemonic::TestAttr => {
                let set = objects.test_attribute(&self.vm.memory, obj, b)?;
                self.do_branch(inst, set)
            }

            // 2OP:0x0B - set_attr
            Mnemonic::SetAttr => {
                objects.set_attribute(&mut self.vm.memory, obj, b)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x0C - clear_attr
            Mnemonic::ClearAttr => {
                objects.clear_attribute(&mut self.vm.memory, obj, b)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x0E - insert_obj
            Mnemonic::InsertObj => {
                if b == 0 {
                    warn!("insert_obj {} into object 0 ignored", obj);
                    return Ok(ExecutionResult::Continue);
                }
                debug!("insert_obj {} into {}", obj, b);
                objects.insert_object(&mut self.vm.memory, obj, b)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x11 - get_prop
            Mnemonic::GetProp => {
                let value = objects.get_property(&self.vm.memory, obj, b as u8)?;
                self.store_result(inst, value)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x12 - get_prop_addr
            Mnemonic::GetPropAddr => {
                let address = objects.get_property_address(&self.vm.memory, obj, b as u8)?;
                self.store_result(inst, address as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // 2OP:0x13 - get_next_prop
            Mnemonic::GetNextProp => {
                let next = objects.get_next_property(&self.vm.memory, obj, b as u8)?;
                self.store_result(inst, next as u16)?;
                Ok(ExecutionResult::Continue)
            }

            // ---- VAR OBJECT OPERATIONS ----

            // VAR:0x03 - put_prop
            Mnemonic::PutProp => {
                let value = operands.get(2).copied().unwrap_or(0);
                objects.put_property(&mut self.vm.memory, obj, b as u8, value)?;
                Ok(ExecutionResult::Continue)
            }

            _ => Err(VmError::InvalidStory(format!(
                "Unhandled object opcode: {}",
                inst.name()
            ))),
        }
    }

    /// An object opcode applied to object 0: store 0, branch false, change nothing
    fn object_zero(&mut self, inst: &Instruction) -> Result<ExecutionResult> {
        warn!(
            "{} on object 0 at {:05x} ignored",
            inst.name(),
            inst.address
        );
        self.store_result(inst, 0)?;
        self.do_branch(inst, false)
    }
}
