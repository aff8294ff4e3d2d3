//! Linux ioctl request encoding and the raw structs exchanged with the
//! evdev and joydev drivers.

use std::io;
use std::os::unix::io::RawFd;

use crate::capability::ABS_CNT;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const EVDEV_IOCTL_TYPE: u8 = b'E';
const JOYDEV_IOCTL_TYPE: u8 = b'j';

const EVIOC_NR_GABS: u8 = 0x40;
const EVIOC_NR_SABS: u8 = 0xc0;
const JSIOC_NR_GAXES: u8 = 0x11;
const JSIOC_NR_SCORR: u8 = 0x21;
const JSIOC_NR_GCORR: u8 = 0x22;
const JSIOC_NR_GAXMAP: u8 = 0x32;

/// `struct input_absinfo`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawAbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// `struct js_corr`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawCorrection {
    pub coef: [i32; 8],
    pub prec: i16,
    pub kind: u16,
}

const fn ioctl_code(direction: u32, kind: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const fn ior<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ, kind, nr, std::mem::size_of::<T>())
}

const fn iow<T>(kind: u8, nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_WRITE, kind, nr, std::mem::size_of::<T>())
}

pub(crate) const JSIOCGAXES: libc::c_ulong = ior::<u8>(JOYDEV_IOCTL_TYPE, JSIOC_NR_GAXES);
pub(crate) const JSIOCGAXMAP: libc::c_ulong =
    ior::<[u8; ABS_CNT]>(JOYDEV_IOCTL_TYPE, JSIOC_NR_GAXMAP);
pub(crate) const JSIOCGCORR: libc::c_ulong =
    ior::<RawCorrection>(JOYDEV_IOCTL_TYPE, JSIOC_NR_GCORR);
pub(crate) const JSIOCSCORR: libc::c_ulong =
    iow::<RawCorrection>(JOYDEV_IOCTL_TYPE, JSIOC_NR_SCORR);

/// `EVIOCGABS(axis)`; `axis` must be below `ABS_CNT`.
pub(crate) const fn eviocgabs(axis: u8) -> libc::c_ulong {
    ior::<RawAbsInfo>(EVDEV_IOCTL_TYPE, EVIOC_NR_GABS + axis)
}

/// `EVIOCSABS(axis)`; `axis` must be below `ABS_CNT`.
pub(crate) const fn eviocsabs(axis: u8) -> libc::c_ulong {
    iow::<RawAbsInfo>(EVDEV_IOCTL_TYPE, EVIOC_NR_SABS + axis)
}

/// Issues `request` on `fd` with a pointer to `arg`.
pub(crate) fn ioctl_ptr<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> io::Result<()> {
    // SAFETY: callers pass a pointer to a live buffer at least as large as the
    // kernel copies for `request`.
    let rc = unsafe { libc::ioctl(fd, request, arg) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
