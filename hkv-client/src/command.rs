//! # Command Builder
//!
//! Purpose: Build commands as an ordered list of typed arguments instead of
//! printf-style format strings, so user data can never change the shape of
//! the request.
//!
//! ```text
//! Command::new("SET").arg("tkey1").arg(100)
//!   -> ["SET", "tkey1", "100"]
//!   -> *3\r\n$3\r\nSET\r\n$5\r\ntkey1\r\n$3\r\n100\r\n
//! ```

use std::fmt;

use bytes::Bytes;

/// Conversion of a typed value into one binary-safe command argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for [u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl<const N: usize> ToArg for [u8; N] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl<T: ToArg + ?Sized> ToArg for &T {
    fn to_arg(&self) -> Bytes {
        (**self).to_arg()
    }
}

macro_rules! impl_display_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToArg for $ty {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

impl_display_arg!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// One request: the command name followed by its arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command with its name as the first argument.
    pub fn new(name: &str) -> Self {
        Command {
            args: vec![name.to_arg()],
        }
    }

    /// Appends one argument.
    pub fn arg<A: ToArg>(mut self, arg: A) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Appends every argument of an iterator, in order.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToArg,
    {
        self.args.extend(args.into_iter().map(|arg| arg.to_arg()));
        self
    }

    /// Command name as sent on the wire.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    pub fn as_args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only the name: arguments may carry credentials.
        f.debug_struct("Command")
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("args", &(self.args.len() - 1))
            .finish()
    }
}
