// Copyright (c) 2025 Syswonder
// ion-tiler is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//     http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR
// FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.
//
// Syswonder Website:
//      https://www.syswonder.org
//
// Authors:
//
use alloc::string::String;
use core::fmt::{Debug, Display, Formatter, Result};

/// Errno values the heap hands back through the ION ioctl layer.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum IonErrorNum {
    ENOENT = 2,  // Unknown buffer handle or heap.
    ENOMEM = 12, // Tiler space, carveout or sg table exhausted.
    EFAULT = 14, // Physical page without a page descriptor.
    EBUSY = 16,  // Heap or tiler block still in use.
    EEXIST = 17, // Heap id registered twice.
    ENODEV = 19, // No heap of the requested id.
    EINVAL = 22, // Malformed request or platform data.
    ERANGE = 34, // Carveout wraps the address space.
}

/// A failed heap operation, with the source location that raised it.
pub struct IonError {
    pub num: IonErrorNum,
    pub loc_line: u32,
    pub loc_col: u32,
    pub loc_file: &'static str,
    pub msg: Option<String>,
}

pub type IonResult<T = ()> = core::result::Result<T, IonError>;

impl IonErrorNum {
    pub fn as_str(&self) -> &'static str {
        use IonErrorNum::*;
        match *self {
            ENOENT => "No such file or directory",
            ENOMEM => "Out of memory",
            EFAULT => "Bad address",
            EBUSY => "Device or resource busy",
            EEXIST => "File exists",
            ENODEV => "No such device",
            EINVAL => "Invalid argument",
            ERANGE => "Math result not representable",
        }
    }
}

impl IonError {
    pub fn new(
        num: IonErrorNum,
        loc_file: &'static str,
        loc_line: u32,
        loc_col: u32,
        msg: Option<String>,
    ) -> Self {
        Self {
            num,
            loc_file,
            loc_line,
            loc_col,
            msg,
        }
    }

    /// Negative errno, as handed back to ioctl callers.
    pub fn code(&self) -> isize {
        -(self.num as usize as isize)
    }
}

impl Debug for IonError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(
            f,
            "[{}:{}:{}] {}",
            self.loc_file,
            self.loc_line,
            self.loc_col,
            self.num.as_str()
        )?;
        if let Some(ref msg) = self.msg {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl Display for IonError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self.msg {
            Some(ref msg) => write!(f, "{}: {}", self.num.as_str(), msg),
            None => f.write_str(self.num.as_str()),
        }
    }
}

/// Build an `IonError` for `$num` at the call site, optionally with a message.
#[macro_export]
macro_rules! ion_err {
    ($num: ident) => {{
        use $crate::error::{IonError, IonErrorNum::*};
        IonError::new($num, file!(), line!(), column!(), None)
    }};
    ($num: ident, $msg: expr) => {{
        use $crate::error::{IonError, IonErrorNum::*};
        IonError::new($num, file!(), line!(), column!(), Some($msg.into()))
    }};
}

/// `Err(ion_err!(..))`, for returning straight out of a heap operation.
#[macro_export]
macro_rules! ion_result_err {
    ($num: ident) => {
        Err(ion_err!($num))
    };
    ($num: ident, $msg: expr) => {
        Err(ion_err!($num, $msg))
    };
}
