use std::collections::HashMap;
use std::fmt;

/// A micro-op encoded as a bitmask over execution ports: bit `k` set means
/// the uop may run on port `k`. Stored uops are always in
/// `[1, (1 << num_ports) - 1]`.
pub type Uop = u32;

/// Multiplicity of a uop within a mapping entry.
pub type UopCount = u32;

/// Dense index of an instruction within its architecture, assigned in
/// insertion order.
pub type InsnId = usize;

/// Ports are named by letters (`A` is port 0), which caps the mask width.
pub const MAX_PORTS: usize = 26;

#[derive(Debug)]
pub struct Instruction {
    name: String,
    id: InsnId,
}

impl Instruction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> InsnId {
        self.id
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Owns all instructions of the machine under inference and the port
/// count. Instruction names are unique; looking a name up twice yields the
/// same id.
#[derive(Debug, Default)]
pub struct Architecture {
    num_ports: usize,
    insns: Vec<Instruction>,
    by_name: HashMap<String, InsnId>,
}

impl Architecture {
    pub fn new(num_ports: usize) -> Self {
        Self {
            num_ports,
            insns: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Look up `name`, creating the instruction on first sight.
    pub fn intern(&mut self, name: &str) -> InsnId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.insns.len();
        self.insns.push(Instruction {
            name: name.to_string(),
            id,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<InsnId> {
        self.by_name.get(name).copied()
    }

    pub fn insn(&self, id: InsnId) -> &Instruction {
        &self.insns[id]
    }

    pub fn insns(&self) -> &[Instruction] {
        &self.insns
    }

    pub fn num_insns(&self) -> usize {
        self.insns.len()
    }

    pub fn num_ports(&self) -> usize {
        self.num_ports
    }

    pub fn set_num_ports(&mut self, n: usize) {
        debug_assert!(n >= 1 && n <= MAX_PORTS);
        self.num_ports = n;
    }

    /// The full-port mask, which is also the upper bound of the uop range.
    pub fn largest_uop(&self) -> Uop {
        ((1u64 << self.num_ports) - 1) as Uop
    }
}

/// Render a uop mask as port letters, lowest port first.
pub fn uop_letters(uop: Uop) -> String {
    (0..MAX_PORTS)
        .filter(|k| uop & (1 << k) != 0)
        .map(|k| (b'A' + k as u8) as char)
        .collect()
}

/// Parse a duplicate-free string of port letters into a uop mask.
pub fn uop_from_letters(s: &str) -> Result<Uop, String> {
    let mut res: Uop = 0;
    for c in s.chars() {
        if !c.is_ascii_uppercase() {
            return Err(format!("Invalid port name '{c}' in uop!"));
        }
        let mask = 1 << (c as u8 - b'A');
        if res & mask != 0 {
            return Err(format!("Duplicate port name '{c}' in uop!"));
        }
        res |= mask;
    }
    if res == 0 {
        return Err("Empty uop!".to_string());
    }
    Ok(res)
}
