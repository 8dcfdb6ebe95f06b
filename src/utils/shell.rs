//! Shell quoting for log output
//!
//! Commands are always spawned with discrete arguments. This is only used to
//! render a copy-pasteable command line in logs and diagnostics.

/// Quote a single argument for a POSIX shell
pub fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Join a program and its arguments into one quoted line
pub fn join<I, S>(program: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = quote(program);
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg.as_ref()));
    }
    line
}
