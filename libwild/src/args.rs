//! The slice of the driver's configuration that the backend actually reads.
//! Parsing a command line into this is the driver's job (a non-goal here);
//! this module is a plain, immutable value the driver builds and hands in.

/// Whether the output being produced still contains unresolved relocations
/// that a later tool (or the dynamic linker) must apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationModel {
    /// Addresses are fixed at link time; nothing is PIC.
    NonRelocatable,
    /// The output carries its own dynamic relocations (PIE or shared).
    Relocatable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A `static-pie`-capable executable when `RelocationModel::Relocatable`,
    /// a plain static (non-PIC) executable otherwise.
    StaticExecutable(RelocationModel),
    /// A dynamically-linked executable; `RelocationModel::Relocatable` means
    /// PIE.
    DynamicExecutable(RelocationModel),
    SharedObject,
    /// `-r`: a partial link producing another relocatable object, not a
    /// loadable image. The backend's relaxations never fire against this
    /// (`Relaxation::new`'s `non_relocatable` check), matching
    /// `Config->Relocatable` in the original.
    Relocatable,
}

impl OutputKind {
    pub fn is_relocatable(self) -> bool {
        matches!(self, OutputKind::Relocatable)
    }

    pub fn is_executable(self) -> bool {
        matches!(
            self,
            OutputKind::StaticExecutable(_) | OutputKind::DynamicExecutable(_)
        )
    }

    pub fn is_shared(self) -> bool {
        matches!(self, OutputKind::SharedObject)
    }

    /// `Config->Pic`: is every reference required to be position independent?
    pub fn is_pic(self) -> bool {
        matches!(
            self,
            OutputKind::SharedObject
                | OutputKind::StaticExecutable(RelocationModel::Relocatable)
                | OutputKind::DynamicExecutable(RelocationModel::Relocatable)
        )
    }
}

/// Endianness of the target, independent of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bits32,
    Bits64,
}

/// `(machine, width, endian)`: fixed once the driver has finished parsing
/// the command line and reading the first input's `e_machine`/`EI_CLASS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineId {
    pub machine: u16,
    pub width: Width,
    pub endian: Endian,
}

/// The read-only configuration surface the backend and its classifiers
/// consult. Everything else the driver parses (input file list, output
/// path, linker-script contents, GC/ICF toggles that affect section
/// *placement*) is out of scope here.
#[derive(Debug, Clone)]
pub struct Config {
    pub machine: MachineId,
    pub output_kind: OutputKind,
}

impl Config {
    pub fn is_shared(&self) -> bool {
        self.output_kind.is_shared()
    }

    pub fn is_pic(&self) -> bool {
        self.output_kind.is_pic()
    }
}
