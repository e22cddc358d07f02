//! Named signature definitions and on-disk signature sets.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::signature::Pattern;

/// Follow a RIP-relative instruction embedded in a match to its target.
///
/// The instruction starts at `instr_offset` bytes into the match and is
/// `instr_len` bytes long; the 4-byte displacement sits at `disp_offset`
/// within the instruction. The target is the displacement added to the
/// address of the next instruction, optionally dereferenced as a pointer
/// slot, optionally shifted by a constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RipRelative {
    pub instr_offset: usize,
    pub disp_offset: usize,
    pub instr_len: usize,
    #[serde(default)]
    pub deref: bool,
    #[serde(default)]
    pub addend: i64,
}

/// A signature: a pattern string plus a unique name. The name, not the
/// pattern content, is the identity used for cache keying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureDef {
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rip: Option<RipRelative>,
}

impl SignatureDef {
    pub fn parsed_pattern(&self) -> Result<Pattern> {
        Pattern::parse(&self.pattern)
    }
}

/// The full set of signatures for one host build line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureSet {
    pub host_version: String,
    pub defs: Vec<SignatureDef>,
}

impl SignatureSet {
    pub fn def(&self, name: &str) -> Option<&SignatureDef> {
        self.defs.iter().find(|def| def.name.eq_ignore_ascii_case(name))
    }
}

pub fn load_signatures<P: AsRef<Path>>(path: P) -> Result<SignatureSet> {
    let content = fs::read_to_string(&path)?;
    let set = serde_json::from_str(&content)?;
    Ok(set)
}

pub fn save_signatures<P: AsRef<Path>>(path: P, set: &SignatureSet) -> Result<()> {
    let content = serde_json::to_string_pretty(set)?;
    fs::write(path, content)?;
    Ok(())
}
