/// A sub-register and the full register it lives in.
pub struct Alias {
    pub name: &'static str,
    pub parent: &'static str,
    pub size: u8,
}

macro_rules! aliases {
    ($parent:literal => $($name:literal : $size:literal),+ $(,)?) => (
        [ $(Alias { name: $name, parent: $parent, size: $size, }),+ ]
    )
}

static RAX: &[Alias] = &aliases!("rax" => "rax": 8, "eax": 4, "ax": 2, "al": 1, "ah": 1);
static RBX: &[Alias] = &aliases!("rbx" => "rbx": 8, "ebx": 4, "bx": 2, "bl": 1, "bh": 1);
static RCX: &[Alias] = &aliases!("rcx" => "rcx": 8, "ecx": 4, "cx": 2, "cl": 1, "ch": 1);
static RDX: &[Alias] = &aliases!("rdx" => "rdx": 8, "edx": 4, "dx": 2, "dl": 1, "dh": 1);
static RSI: &[Alias] = &aliases!("rsi" => "rsi": 8, "esi": 4, "si": 2, "sil": 1);
static RDI: &[Alias] = &aliases!("rdi" => "rdi": 8, "edi": 4, "di": 2, "dil": 1);
static RBP: &[Alias] = &aliases!("rbp" => "rbp": 8, "ebp": 4, "bp": 2, "bpl": 1);
static RSP: &[Alias] = &aliases!("rsp" => "rsp": 8, "esp": 4, "sp": 2, "spl": 1);
static R8: &[Alias] = &aliases!("r8" => "r8": 8, "r8d": 4, "r8w": 2, "r8b": 1);
static R9: &[Alias] = &aliases!("r9" => "r9": 8, "r9d": 4, "r9w": 2, "r9b": 1);
static R10: &[Alias] = &aliases!("r10" => "r10": 8, "r10d": 4, "r10w": 2, "r10b": 1);
static R11: &[Alias] = &aliases!("r11" => "r11": 8, "r11d": 4, "r11w": 2, "r11b": 1);
static R12: &[Alias] = &aliases!("r12" => "r12": 8, "r12d": 4, "r12w": 2, "r12b": 1);
static R13: &[Alias] = &aliases!("r13" => "r13": 8, "r13d": 4, "r13w": 2, "r13b": 1);
static R14: &[Alias] = &aliases!("r14" => "r14": 8, "r14d": 4, "r14w": 2, "r14b": 1);
static R15: &[Alias] = &aliases!("r15" => "r15": 8, "r15d": 4, "r15w": 2, "r15b": 1);
static RIP: &[Alias] = &aliases!("rip" => "rip": 8, "eip": 4);
static RFLAGS: &[Alias] = &aliases!("rflags" => "rflags": 8, "eflags": 4);

static GPRS: &[&[Alias]] = &[
    RAX, RBX, RCX, RDX, RSI, RDI, RBP, RSP, R8, R9, R10, R11, R12, R13, R14, R15, RIP, RFLAGS,
];

pub const PC: &str = "rip";
pub const FLAGS: &str = "rflags";

pub fn lookup(name: &str) -> Option<&'static Alias> {
    GPRS.iter()
        .flat_map(|family| family.iter())
        .find(|alias| alias.name == name)
}

/// Full register name for `name`, e.g. `r8d` -> `r8`. Unknown names map to themselves.
pub fn canonical(name: &str) -> String {
    lookup(name)
        .map(|alias| alias.parent.to_string())
        .unwrap_or_else(|| name.to_string())
}

pub fn size_of(name: &str) -> u8 {
    lookup(name).map(|alias| alias.size).unwrap_or(8)
}

#[derive(Debug, Clone, Copy)]
pub enum Flag {
    Carry = 0,
    Parity = 2,
    Zero = 6,
    Sign = 7,
    Overflow = 11,
}

pub fn flag(rflags: u64, flag: Flag) -> bool {
    rflags & (1 << flag as u64) != 0
}
