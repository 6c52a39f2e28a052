//! Command line quoting and splitting.
//!
//! Arguments are quoted so that the Windows command line tokenizer
//! (see <https://learn.microsoft.com/en-us/windows/win32/api/shellapi/nf-shellapi-commandlinetoargvw>)
//! recovers every token exactly.

use std::{borrow::Cow, iter::repeat, mem};

use log::trace;

fn is_separator(c: char) -> bool { c == ' ' || c == '\t' }

/// Quote a single argument for the Windows command line tokenizer.
///
/// Arguments without whitespace and quotes are returned unchanged and the empty argument becomes `""`.
/// Otherwise the argument is wrapped in quotes, every literal quote is escaped along with the
/// backslashes preceding it, and a trailing backslash run is doubled.
pub fn quote_arg(arg: &str) -> Cow<'_, str> {
    if arg.is_empty() {
        return Cow::Borrowed("\"\"");
    }
    if !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            c => {
                quoted.extend(repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(repeat('\\').take(backslashes * 2));
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Quote every argument and join them with single spaces.
pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().map(|arg| quote_arg(arg.as_ref()).into_owned()).collect::<Vec<_>>().join(" ")
}

/// Returns the unmodified remainder of a command line after the program name.
///
/// A quoted program name runs to the next quote, an unquoted one to the next whitespace.
/// Whitespace around the program name is skipped.
pub fn remainder_after_program(command_line: &str) -> &str {
    let rest = command_line.trim_start();
    let rest = match rest.strip_prefix('"') {
        Some(quoted) => quoted.find('"').map(|end| &quoted[end + 1..]).unwrap_or(""),
        None => rest.find(char::is_whitespace).map(|end| &rest[end..]).unwrap_or(""),
    };
    rest.trim_start()
}

/// Split a command line into the program name and arguments the way `CommandLineToArgvW` does.
///
/// The program name is always the first token, even if it is empty.
pub fn split_command_line(command_line: &str) -> Vec<String> {
    let mut chars = command_line.chars().peekable();

    // the program name has no escapes
    let mut program = String::new();
    if chars.next_if_eq(&'"').is_some() {
        for c in chars.by_ref() {
            if c == '"' {
                break;
            }
            program.push(c);
        }
    } else {
        while let Some(c) = chars.next_if(|&c| !is_separator(c)) {
            program.push(c);
        }
    }
    let mut args = vec![program];

    while chars.next_if(|&c| is_separator(c)).is_some() {}
    if chars.peek().is_none() {
        return args;
    }

    let mut current = String::new();
    let mut backslashes = 0;
    let mut quotes = 0;
    while let Some(c) = chars.next() {
        match c {
            c if is_separator(c) && quotes == 0 => {
                args.push(mem::take(&mut current));
                backslashes = 0;
                while chars.next_if(|&c| is_separator(c)).is_some() {}
                if chars.peek().is_none() {
                    return args;
                }
            }
            '\\' => {
                current.push('\\');
                backslashes += 1;
            }
            '"' => {
                if backslashes % 2 == 0 {
                    current.truncate(current.len() - backslashes / 2);
                    quotes += 1;
                } else {
                    current.truncate(current.len() - backslashes / 2 - 1);
                    current.push('"');
                }
                backslashes = 0;
                while chars.next_if_eq(&'"').is_some() {
                    quotes += 1;
                    if quotes == 3 {
                        current.push('"');
                        quotes = 0;
                    }
                }
                if quotes == 2 {
                    quotes = 0;
                }
            }
            c => {
                current.push(c);
                backslashes = 0;
            }
        }
    }
    args.push(current);
    trace!("split {:?} into {:?}", command_line, args);
    args
}

/// Returns the arguments of the current process as a single command line remainder.
///
/// On Windows this is the raw command line after the program name, forwarded without re-parsing.
#[cfg(windows)]
pub fn raw_arguments() -> String {
    use windows_sys::Win32::System::Environment::GetCommandLineW;

    let command_line = unsafe { GetCommandLineW() };
    if command_line.is_null() {
        return String::new();
    }
    let mut length = 0;
    while unsafe { *command_line.add(length) } != 0 {
        length += 1;
    }
    let wide = unsafe { std::slice::from_raw_parts(command_line, length) };
    remainder_after_program(&String::from_utf16_lossy(wide)).to_string()
}

/// Returns the arguments of the current process as a single command line remainder.
///
/// Elsewhere the command line is reconstructed by quoting the process arguments.
#[cfg(not(windows))]
pub fn raw_arguments() -> String {
    join_args(std::env::args_os().skip(1).map(|arg| arg.to_string_lossy().into_owned()))
}
