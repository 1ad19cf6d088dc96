use std::io;

use crate::types::{RedisWrite, ToRedisArgs};

/// Represents one redis command under construction.
///
/// Arguments are accumulated into a single flat buffer; `args` records the
/// end offset of each one, so packing never re-walks the argument values.
#[derive(Clone, Default)]
pub struct Cmd {
    data: Vec<u8>,
    args: Vec<usize>,
}

/// Shortcut for creating a command with the given name.
///
/// ```rust
/// let mut c = redis_mux::cmd("GET");
/// c.arg("my_key");
/// ```
pub fn cmd(name: &str) -> Cmd {
    let mut rv = Cmd::new();
    rv.arg(name);
    rv
}

fn countdigits(mut v: usize) -> usize {
    let mut result = 1;
    loop {
        if v < 10 {
            return result;
        }
        if v < 100 {
            return result + 1;
        }
        if v < 1000 {
            return result + 2;
        }
        if v < 10000 {
            return result + 3;
        }

        v /= 10000;
        result += 4;
    }
}

#[inline]
fn bulklen(len: usize) -> usize {
    1 + countdigits(len) + 2 + len + 2
}

impl RedisWrite for Cmd {
    fn write_arg(&mut self, arg: &[u8]) {
        self.data.extend_from_slice(arg);
        self.args.push(self.data.len());
    }

    fn write_arg_fmt(&mut self, arg: impl std::fmt::Display) {
        use std::io::Write;
        write!(self.data, "{arg}").expect("writing to a Vec cannot fail");
        self.args.push(self.data.len());
    }
}

impl Cmd {
    /// Creates a new empty command.
    pub fn new() -> Cmd {
        Cmd::default()
    }

    /// Appends an argument. Scalars add one argument, slices and tuples
    /// flatten (see [`ToRedisArgs`]).
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Cmd {
        arg.write_redis_args(self);
        self
    }

    /// Number of arguments, the command name included.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns true if no argument has been added yet.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Iterates the raw argument byte strings.
    pub fn args_iter(&self) -> impl Iterator<Item = &[u8]> + Clone + ExactSizeIterator {
        let mut prev = 0;
        self.args.iter().map(move |&end| {
            let arg = &self.data[prev..end];
            prev = end;
            arg
        })
    }

    /// Returns the packed wire form: `*<N>` followed by each argument as a
    /// length-prefixed bulk string.
    pub fn get_packed_command(&self) -> Vec<u8> {
        let mut cmd = Vec::with_capacity(self.packed_len());
        self.write_packed_command(&mut cmd);
        cmd
    }

    pub(crate) fn packed_len(&self) -> usize {
        let mut total = 1 + countdigits(self.args.len()) + 2;
        for arg in self.args_iter() {
            total += bulklen(arg.len());
        }
        total
    }

    pub(crate) fn write_packed_command(&self, cmd: &mut Vec<u8>) {
        write_command(cmd, self.args_iter()).expect("writing to a Vec cannot fail")
    }
}

fn write_command<'a, I>(cmd: &mut (impl ?Sized + io::Write), args: I) -> io::Result<()>
where
    I: IntoIterator<Item = &'a [u8]> + ExactSizeIterator,
{
    let mut buf = ::itoa::Buffer::new();

    cmd.write_all(b"*")?;
    cmd.write_all(buf.format(args.len()).as_bytes())?;
    cmd.write_all(b"\r\n")?;

    for bytes in args {
        cmd.write_all(b"$")?;
        cmd.write_all(buf.format(bytes.len()).as_bytes())?;
        cmd.write_all(b"\r\n")?;
        cmd.write_all(bytes)?;
        cmd.write_all(b"\r\n")?;
    }
    Ok(())
}

/// Packs raw byte-string parts into wire form without going through a
/// [`Cmd`]. This is the low-level form of request submission.
pub fn pack_command(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut total = 1 + countdigits(parts.len()) + 2;
    for part in parts {
        total += bulklen(part.len());
    }
    let mut out = Vec::with_capacity(total);
    write_command(&mut out, parts.iter().map(|part| &part[..]))
        .expect("writing to a Vec cannot fail");
    out
}
