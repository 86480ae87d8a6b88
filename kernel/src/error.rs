//! Kernel-wide error taxonomy.
//!
//! Internal code threads `Result<T, KernelError>` with `?` instead of raw
//! integers or string literals. The syscall boundary is the only place a
//! `KernelError` is collapsed to the ABI's negative-integer taxonomy (see
//! [`KernelError::to_abi`] and [`AbiError`]).

use core::fmt;

/// Per-subsystem error for the physical/virtual memory managers and heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// The PMM bitmap has no free frames left.
    NoFrame,
    /// A virtual or physical address argument was not frame/order aligned.
    InvalidAlignment,
    /// `translate` walked off the end of a table level that was not present.
    Unmapped,
    /// The buddy heap has no block large enough to satisfy a request.
    OutOfMemory,
    /// A block header failed a consistency check (self-loop, bad magic).
    HeapCorrupt,
    /// `setup_initial_stack` ran off the bottom of the process's fixed
    /// stack region before it finished writing argv/envp.
    StackOverflow,
}

/// Per-subsystem error for process/scheduler operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// No pid in the table matches.
    NotFound,
    /// The process's descriptor table has no free slot.
    NoDescriptorSlot,
    /// The requested descriptor slot is empty (holds the null stream).
    BadDescriptor,
}

/// Per-subsystem error for the stream layer and VFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No mount owns the resolved path.
    NoSuchMount,
    /// The path does not resolve to an existing node.
    NotFound,
    /// The open action's preconditions were not met (e.g. `read` on an
    /// absent file without `create`).
    InvalidAction,
    /// The mount tree or a filesystem's private state is inconsistent.
    Corrupt,
    /// `..` was resolved above `/`, or a segment was otherwise malformed.
    InvalidPath,
}

/// Per-subsystem error for the device manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    /// No driver or device matched the lookup key.
    NotFound,
    /// The device's operation vector has no entry for the requested op.
    Unsupported,
    /// A bounded spin (e.g. a virtio used-ring wait) exceeded its budget.
    Timeout,
}

/// Per-subsystem error for the syscall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Syscall number has no table entry.
    InvalidSyscall,
    /// A user pointer argument did not translate through the current PML4.
    BadPointer,
    /// An argument failed validation (out of range, unaligned, unknown id).
    InvalidArgument,
}

/// The kernel-wide error type. Every fallible internal operation returns
/// `Result<T, KernelError>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    Mm(MmError),
    Proc(ProcError),
    Fs(FsError),
    Dev(DevError),
    Syscall(SyscallError),
    /// A virtual range requested by a syscall (e.g. a framebuffer target)
    /// is already mapped, or falls outside its permitted window.
    AccessDenied,
    /// Everything else. Scheduled to be eliminated (see DESIGN.md).
    Unknown,
}

impl From<MmError> for KernelError {
    fn from(e: MmError) -> Self {
        KernelError::Mm(e)
    }
}
impl From<ProcError> for KernelError {
    fn from(e: ProcError) -> Self {
        KernelError::Proc(e)
    }
}
impl From<FsError> for KernelError {
    fn from(e: FsError) -> Self {
        KernelError::Fs(e)
    }
}
impl From<DevError> for KernelError {
    fn from(e: DevError) -> Self {
        KernelError::Dev(e)
    }
}
impl From<SyscallError> for KernelError {
    fn from(e: SyscallError) -> Self {
        KernelError::Syscall(e)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Mm(MmError::NoFrame) => write!(f, "no free physical frame"),
            KernelError::Mm(MmError::InvalidAlignment) => write!(f, "invalid alignment"),
            KernelError::Mm(MmError::Unmapped) => write!(f, "address not mapped"),
            KernelError::Mm(MmError::OutOfMemory) => write!(f, "heap out of memory"),
            KernelError::Mm(MmError::HeapCorrupt) => write!(f, "heap invariant violated"),
            KernelError::Mm(MmError::StackOverflow) => write!(f, "initial stack overflowed"),
            KernelError::Proc(ProcError::NotFound) => write!(f, "no such process"),
            KernelError::Proc(ProcError::NoDescriptorSlot) => write!(f, "descriptor table full"),
            KernelError::Proc(ProcError::BadDescriptor) => write!(f, "bad descriptor"),
            KernelError::Fs(FsError::NoSuchMount) => write!(f, "no mount for path"),
            KernelError::Fs(FsError::NotFound) => write!(f, "path not found"),
            KernelError::Fs(FsError::InvalidAction) => write!(f, "invalid open action"),
            KernelError::Fs(FsError::Corrupt) => write!(f, "vfs structure corrupt"),
            KernelError::Fs(FsError::InvalidPath) => write!(f, "invalid path"),
            KernelError::Dev(DevError::NotFound) => write!(f, "no such device"),
            KernelError::Dev(DevError::Unsupported) => write!(f, "operation unsupported"),
            KernelError::Dev(DevError::Timeout) => write!(f, "device timed out"),
            KernelError::Syscall(SyscallError::InvalidSyscall) => {
                write!(f, "invalid syscall number")
            }
            KernelError::Syscall(SyscallError::BadPointer) => {
                write!(f, "user pointer did not translate")
            }
            KernelError::Syscall(SyscallError::InvalidArgument) => write!(f, "invalid argument"),
            KernelError::AccessDenied => write!(f, "access denied"),
            KernelError::Unknown => write!(f, "unknown error"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;

/// The ABI's negative-integer error taxonomy (spec §6/§7). Returned from
/// every syscall as `-(code as i64)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum AbiError {
    Success = 0,
    InvArg = 1,
    Overflow = 2,
    Corrupt = 4,
    NoMem = 5,
    Unavailable = 6,
    Timeout = 7,
    AccessDenied = 8,
    Unknown = 10,
    Test = 11,
}

impl KernelError {
    /// Collapse a `KernelError` to the ABI's negative-integer taxonomy.
    /// This is the only place the typed error is discarded.
    pub fn to_abi(self) -> AbiError {
        match self {
            KernelError::Mm(MmError::NoFrame) | KernelError::Mm(MmError::OutOfMemory) => {
                AbiError::NoMem
            }
            KernelError::Mm(MmError::InvalidAlignment) => AbiError::InvArg,
            KernelError::Mm(MmError::Unmapped) => AbiError::InvArg,
            KernelError::Mm(MmError::HeapCorrupt) => AbiError::Corrupt,
            KernelError::Mm(MmError::StackOverflow) => AbiError::Overflow,
            KernelError::Proc(ProcError::NotFound) => AbiError::InvArg,
            KernelError::Proc(ProcError::NoDescriptorSlot) => AbiError::NoMem,
            KernelError::Proc(ProcError::BadDescriptor) => AbiError::InvArg,
            KernelError::Fs(FsError::NoSuchMount) => AbiError::InvArg,
            KernelError::Fs(FsError::NotFound) => AbiError::InvArg,
            KernelError::Fs(FsError::InvalidAction) => AbiError::InvArg,
            KernelError::Fs(FsError::InvalidPath) => AbiError::InvArg,
            KernelError::Fs(FsError::Corrupt) => AbiError::Corrupt,
            KernelError::Dev(DevError::NotFound) => AbiError::InvArg,
            KernelError::Dev(DevError::Unsupported) => AbiError::Unavailable,
            KernelError::Dev(DevError::Timeout) => AbiError::Timeout,
            KernelError::Syscall(SyscallError::InvalidSyscall) => AbiError::InvArg,
            KernelError::Syscall(SyscallError::BadPointer) => AbiError::InvArg,
            KernelError::Syscall(SyscallError::InvalidArgument) => AbiError::InvArg,
            KernelError::AccessDenied => AbiError::AccessDenied,
            KernelError::Unknown => AbiError::Unknown,
        }
    }

    /// The raw negative value a syscall handler returns for this error.
    pub fn to_syscall_return(self) -> i64 {
        -(self.to_abi() as i64)
    }
}
