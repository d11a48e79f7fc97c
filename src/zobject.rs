//! Object tree and property tables
//!
//! Objects live in story memory; nothing here caches them. `ObjectTable`
//! computes addresses and performs every read and write against `Memory`
//! directly. `ZObject` is a read-only snapshot for display and debugging.
//!
//! Layouts:
//! - v1-3: 9-byte entries, 32 attributes, byte-sized relations, 31 defaults
//! - v4+:  14-byte entries, 48 attributes, word-sized relations, 63 defaults

use std::fmt;

use log::{debug, warn};

use crate::error::{Result, VmError};
use crate::header::Header;
use crate::memory::Memory;

/// Longest sibling chain walked before the tree is declared corrupt.
const MAX_CHAIN_LENGTH: usize = 0xFFFF;

/// Property numbers strictly descend, so a list has at most this many records.
const MAX_PROPERTY_RECORDS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectLayout {
    pub entry_size: u32,
    pub attribute_count: u16,
    pub default_properties: u16,
    /// Width of the parent/sibling/child fields in bytes
    pub relation_width: u32,
    pub parent_offset: u32,
    pub property_table_offset: u32,
}

pub const LAYOUT_V3: ObjectLayout = ObjectLayout {
    entry_size: 9,
    attribute_count: 32,
    default_properties: 31,
    relation_width: 1,
    parent_offset: 4,
    property_table_offset: 7,
};

pub const LAYOUT_V4: ObjectLayout = ObjectLayout {
    entry_size: 14,
    attribute_count: 48,
    default_properties: 63,
    relation_width: 2,
    parent_offset: 6,
    property_table_offset: 12,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Relation {
    Parent = 0,
    Sibling = 1,
    Child = 2,
}

/// One decoded property record header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRecord {
    pub number: u8,
    pub size: u16,
    /// Address of the first data byte
    pub data_address: u32,
}

impl PropertyRecord {
    fn next_header(&self) -> u32 {
        self.data_address + self.size as u32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectTable {
    base: u32,
    version: u8,
    layout: ObjectLayout,
}

impl ObjectTable {
    pub fn new(memory: &Memory) -> Self {
        let header = Header::new(memory);
        let version = header.version();
        ObjectTable {
            base: header.object_table() as u32,
            version,
            layout: if version <= 3 { LAYOUT_V3 } else { LAYOUT_V4 },
        }
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    /// Address of object `obj`'s entry. Object 0 has none.
    pub fn object_address(&self, obj: u16) -> Result<u32> {
        if obj == 0 {
            return Err(VmError::InvalidObject(obj));
        }
        if self.layout.relation_width == 1 && obj > 255 {
            return Err(VmError::InvalidObject(obj));
        }
        Ok(self.base
            + self.layout.default_properties as u32 * 2
            + (obj as u32 - 1) * self.layout.entry_size)
    }

    fn relation_address(&self, obj: u16, relation: Relation) -> Result<u32> {
        Ok(self.object_address(obj)?
            + self.layout.parent_offset
            + relation as u32 * self.layout.relation_width)
    }

    fn read_relation(&self, memory: &Memory, obj: u16, relation: Relation) -> Result<u16> {
        let address = self.relation_address(obj, relation)?;
        if self.layout.relation_width == 1 {
            Ok(memory.read_byte(address)? as u16)
        } else {
            memory.read_word(address)
        }
    }

    fn write_relation(
        &self,
        memory: &mut Memory,
        obj: u16,
        relation: Relation,
        value: u16,
    ) -> Result<()> {
        let address = self.relation_address(obj, relation)?;
        if self.layout.relation_width == 1 {
            memory.write_byte(address, value as u8)
        } else {
            memory.write_word(address, value)
        }
    }

    pub fn get_parent(&self, memory: &Memory, obj: u16) -> Result<u16> {
        self.read_relation(memory, obj, Relation::Parent)
    }

    pub fn get_sibling(&self, memory: &Memory, obj: u16) -> Result<u16> {
        self.read_relation(memory, obj, Relation::Sibling)
    }

    pub fn get_child(&self, memory: &Memory, obj: u16) -> Result<u16> {
        self.read_relation(memory, obj, Relation::Child)
    }

    /// Attribute `n` lives at bit (31-n) of the leading dword, or bit (47-n)
    /// of the following word for n >= 32.
    fn attribute_location(&self, obj: u16, attr: u16) -> Result<Option<(u32, bool, u32)>> {
        if attr >= self.layout.attribute_count {
            warn!(
                "Attribute {} out of range for v{} object {}",
                attr, self.version, obj
            );
            return Ok(None);
        }
        let address = self.object_address(obj)?;
        if attr < 32 {
            Ok(Some((address, true, 31 - attr as u32)))
        } else {
            Ok(Some((address + 4, false, 47 - attr as u32)))
        }
    }

    pub fn test_attribute(&self, memory: &Memory, obj: u16, attr: u16) -> Result<bool> {
        match self.attribute_location(obj, attr)? {
            Some((address, true, bit)) => Ok(memory.read_dword(address)? & (1 << bit) != 0),
            Some((address, false, bit)) => Ok(memory.read_word(address)? & (1 << bit) != 0),
            None => Ok(false),
        }
    }

    fn update_attribute(&self, memory: &mut Memory, obj: u16, attr: u16, set: bool) -> Result<()> {
        match self.attribute_location(obj, attr)? {
            Some((address, true, bit)) => {
                let value = memory.read_dword(address)?;
                let value = if set { value | (1 << bit) } else { value & !(1 << bit) };
                memory.write_dword(address, value)
            }
            Some((address, false, bit)) => {
                let value = memory.read_word(address)?;
                let mask = 1u16 << bit;
                let value = if set { value | mask } else { value & !mask };
                memory.write_word(address, value)
            }
            None => Ok(()),
        }
    }

    pub fn set_attribute(&self, memory: &mut Memory, obj: u16, attr: u16) -> Result<()> {
        self.update_attribute(memory, obj, attr, true)
    }

    pub fn clear_attribute(&self, memory: &mut Memory, obj: u16, attr: u16) -> Result<()> {
        self.update_attribute(memory, obj, attr, false)
    }

    /// Detach `obj` from its parent, leaving it with no parent and no sibling.
    pub fn remove_object(&self, memory: &mut Memory, obj: u16) -> Result<()> {
        let parent = self.get_parent(memory, obj)?;
        if parent == 0 {
            return Ok(());
        }
        let sibling = self.get_sibling(memory, obj)?;
        let first = self.get_child(memory, parent)?;

        if first == obj {
            self.write_relation(memory, parent, Relation::Child, sibling)?;
        } else {
            let mut current = first;
            let mut steps = 0;
            loop {
                if current == 0 || steps >= MAX_CHAIN_LENGTH {
                    return Err(VmError::MalformedObjectTree(format!(
                        "object {} not found in child list of its parent {}",
                        obj, parent
                    )));
                }
                let next = self.get_sibling(memory, current)?;
                if next == obj {
                    self.write_relation(memory, current, Relation::Sibling, sibling)?;
                    break;
                }
                current = next;
                steps += 1;
            }
        }

        self.write_relation(memory, obj, Relation::Parent, 0)?;
        self.write_relation(memory, obj, Relation::Sibling, 0)?;
        debug!("remove_obj: {} detached from {}", obj, parent);
        Ok(())
    }

    /// Make `obj` the first child of `dest`, unlinking it from wherever it was.
    pub fn insert_object(&self, memory: &mut Memory, obj: u16, dest: u16) -> Result<()> {
        if obj == dest {
            return Err(VmError::MalformedObjectTree(format!(
                "cannot insert object {} into itself",
                obj
            )));
        }
        // Validate the destination before touching the tree
        self.object_address(dest)?;

        self.remove_object(memory, obj)?;
        let first = self.get_child(memory, dest)?;
        self.write_relation(memory, obj, Relation::Sibling, first)?;
        self.write_relation(memory, obj, Relation::Parent, dest)?;
        self.write_relation(memory, dest, Relation::Child, obj)?;
        debug!("insert_obj: {} -> {}", obj, dest);
        Ok(())
    }

    /// Address of `obj`'s property table (its short-name header).
    pub fn property_table_address(&self, memory: &Memory, obj: u16) -> Result<u32> {
        let address = self.object_address(obj)? + self.layout.property_table_offset;
        Ok(memory.read_word(address)? as u32)
    }

    /// Address of the encoded short name, if the object has one.
    pub fn short_name_address(&self, memory: &Memory, obj: u16) -> Result<Option<u32>> {
        let table = self.property_table_address(memory, obj)?;
        if memory.read_byte(table)? == 0 {
            Ok(None)
        } else {
            Ok(Some(table + 1))
        }
    }

    pub fn property_default(&self, memory: &Memory, property: u8) -> Result<u16> {
        if property == 0 || property as u16 > self.layout.default_properties {
            return Err(VmError::MalformedProperty(format!(
                "no default for property {}",
                property
            )));
        }
        memory.read_word(self.base + (property as u32 - 1) * 2)
    }

    fn first_record_address(&self, memory: &Memory, obj: u16) -> Result<u32> {
        let table = self.property_table_address(memory, obj)?;
        let name_words = memory.read_byte(table)? as u32;
        Ok(table + 1 + name_words * 2)
    }

    /// Decode the record header at `address`; `None` at the terminator.
    pub fn read_record(&self, memory: &Memory, address: u32) -> Result<Option<PropertyRecord>> {
        let first = memory.read_byte(address)?;
        if first == 0 {
            return Ok(None);
        }
        let record = if self.version <= 3 {
            PropertyRecord {
                number: first & 0x1F,
                size: (first >> 5) as u16 + 1,
                data_address: address + 1,
            }
        } else if first & 0x80 != 0 {
            let size = (memory.read_byte(address + 1)? & 0x3F) as u16;
            PropertyRecord {
                number: first & 0x3F,
                size: if size == 0 { 64 } else { size },
                data_address: address + 2,
            }
        } else {
            PropertyRecord {
                number: first & 0x3F,
                size: if first & 0x40 != 0 { 2 } else { 1 },
                data_address: address + 1,
            }
        };
        Ok(Some(record))
    }

    /// All property records of `obj`, highest number first.
    pub fn properties(&self, memory: &Memory, obj: u16) -> Result<Vec<PropertyRecord>> {
        let mut records: Vec<PropertyRecord> = Vec::new();
        let mut address = self.first_record_address(memory, obj)?;
        while let Some(record) = self.read_record(memory, address)? {
            if let Some(previous) = records.last() {
                if record.number >= previous.number {
                    return Err(VmError::MalformedProperty(format!(
                        "object {} property list not descending at {:05x} ({} after {})",
                        obj, address, record.number, previous.number
                    )));
                }
            }
            if records.len() >= MAX_PROPERTY_RECORDS {
                return Err(VmError::MalformedProperty(format!(
                    "object {} property list does not terminate",
                    obj
                )));
            }
            address = record.next_header();
            records.push(record);
        }
        Ok(records)
    }

    /// Find `property` in `obj`'s list, stopping as soon as the descending
    /// order shows it is absent.
    pub fn find_property(
        &self,
        memory: &Memory,
        obj: u16,
        property: u8,
    ) -> Result<Option<PropertyRecord>> {
        let mut address = self.first_record_address(memory, obj)?;
        for _ in 0..MAX_PROPERTY_RECORDS {
            match self.read_record(memory, address)? {
                None => return Ok(None),
                Some(record) if record.number == property => return Ok(Some(record)),
                Some(record) if record.number < property => return Ok(None),
                Some(record) => address = record.next_header(),
            }
        }
        Err(VmError::MalformedProperty(format!(
            "object {} property list does not terminate",
            obj
        )))
    }

    /// Value of `property`, falling back to the default table when absent.
    pub fn get_property(&self, memory: &Memory, obj: u16, property: u8) -> Result<u16> {
        match self.find_property(memory, obj, property)? {
            Some(record) => match record.size {
                1 => Ok(memory.read_byte(record.data_address)? as u16),
                2 => memory.read_word(record.data_address),
                size => {
                    warn!(
                        "get_prop on object {} property {} of length {}, reading first word",
                        obj, property, size
                    );
                    memory.read_word(record.data_address)
                }
            },
            None => self.property_default(memory, property),
        }
    }

    /// Data address of `property`, or 0 when the object does not have it.
    pub fn get_property_address(&self, memory: &Memory, obj: u16, property: u8) -> Result<u32> {
        Ok(self
            .find_property(memory, obj, property)?
            .map(|record| record.data_address)
            .unwrap_or(0))
    }

    /// Number of the property after `property` in the list; 0 gives the
    /// first, and the last gives 0.
    pub fn get_next_property(&self, memory: &Memory, obj: u16, property: u8) -> Result<u8> {
        if property == 0 {
            let first = self.first_record_address(memory, obj)?;
            return Ok(self.read_record(memory, first)?.map(|r| r.number).unwrap_or(0));
        }
        match self.find_property(memory, obj, property)? {
            Some(record) => Ok(self
                .read_record(memory, record.next_header())?
                .map(|r| r.number)
                .unwrap_or(0)),
            None => Err(VmError::MalformedProperty(format!(
                "get_next_prop: object {} has no property {}",
                obj, property
            ))),
        }
    }

    pub fn put_property(&self, memory: &mut Memory, obj: u16, property: u8, value: u16) -> Result<()> {
        let record = self.find_property(memory, obj, property)?.ok_or_else(|| {
            VmError::MalformedProperty(format!(
                "put_prop: object {} has no property {}",
                obj, property
            ))
        })?;
        match record.size {
            1 => memory.write_byte(record.data_address, value as u8),
            2 => memory.write_word(record.data_address, value),
            size => {
                warn!(
                    "put_prop on object {} property {} of length {}, writing first word",
                    obj, property, size
                );
                memory.write_word(record.data_address, value)
            }
        }
    }

    /// Length of the property whose data starts at `data_address`, read
    /// back from the size byte just before it. Address 0 gives 0.
    pub fn get_property_length(&self, memory: &Memory, data_address: u32) -> Result<u16> {
        if data_address == 0 {
            return Ok(0);
        }
        let size_byte = memory.read_byte(data_address - 1)?;
        if self.version <= 3 {
            return Ok((size_byte >> 5) as u16 + 1);
        }
        if size_byte & 0x80 != 0 {
            let size = (size_byte & 0x3F) as u16;
            Ok(if size == 0 { 64 } else { size })
        } else if size_byte & 0x40 != 0 {
            Ok(2)
        } else {
            Ok(1)
        }
    }

    /// Read-only snapshot of one object.
    pub fn snapshot(&self, memory: &Memory, obj: u16) -> Result<ZObject> {
        let address = self.object_address(obj)?;
        let attributes = if self.layout.attribute_count > 32 {
            ((memory.read_dword(address)? as u64) << 16) | memory.read_word(address + 4)? as u64
        } else {
            memory.read_dword(address)? as u64
        };
        Ok(ZObject {
            number: obj,
            attributes,
            attribute_count: self.layout.attribute_count,
            parent: self.get_parent(memory, obj)?,
            sibling: self.get_sibling(memory, obj)?,
            child: self.get_child(memory, obj)?,
            property_table: self.property_table_address(memory, obj)?,
            properties: self.properties(memory, obj)?,
        })
    }
}

/// Transient copy of an object's fields. Changing it does not change memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ZObject {
    pub number: u16,
    /// Attribute bits, attribute 0 in the most significant used bit
    pub attributes: u64,
    pub attribute_count: u16,
    pub parent: u16,
    pub sibling: u16,
    pub child: u16,
    pub property_table: u32,
    pub properties: Vec<PropertyRecord>,
}

impl ZObject {
    pub fn has_attribute(&self, attr: u16) -> bool {
        attr < self.attribute_count
            && self.attributes & (1u64 << (self.attribute_count - 1 - attr)) != 0
    }
}

impl fmt::Display for ZObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object {}: attributes", self.number)?;
        for attr in 0..self.attribute_count {
            if self.has_attribute(attr) {
                write!(f, " {}", attr)?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "  parent {} sibling {} child {}",
            self.parent, self.sibling, self.child
        )?;
        write!(f, "  properties at {:04x}:", self.property_table)?;
        for p in &self.properties {
            write!(f, " [{}:{}]", p.number, p.size)?;
        }
        Ok(())
    }
}
