//! Header rewriting for relayed messages.
//!
//! The server buffers a message as the lines received during `DATA` and
//! rewrites its headers before relay: the subject gains the bracketed set
//! tag, and the mailing-list headers identify the expression the message was
//! addressed to. Header values are treated as opaque bytes, so RFC 2047
//! encoded words pass through untouched with the ASCII tag in front of them.

/// Produces the full rewritten message for one recipient expression, with
/// CRLF line endings.
pub fn rewrite(lines: &[String], tag: &str, local_part: &str, domain: &str) -> String {
    let mut lines = lines.to_vec();
    prefix_subject(&mut lines, tag);
    set_list_headers(&mut lines, local_part, domain);
    let mut message = lines.join("\r\n");
    message.push_str("\r\n");
    message
}

/// Index of the first body line (the blank separator), or the line count
/// when the message is all headers.
fn header_end(lines: &[String]) -> usize {
    lines
        .iter()
        .position(|line| line.is_empty())
        .unwrap_or(lines.len())
}

/// Splits `Name: value` and matches the name case-insensitively.
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (header, value) = line.split_once(':')?;
    header
        .trim()
        .eq_ignore_ascii_case(name)
        .then(|| value.trim_start())
}

/// Prepends `[tag] ` to the subject.
///
/// Idempotent: a subject already starting with the exact same bracketed tag
/// is left alone. A missing or empty subject becomes `[tag] (no subject)`.
/// Folded continuation lines stay attached to the rewritten first line.
pub fn prefix_subject(lines: &mut Vec<String>, tag: &str) {
    let bracketed = format!("[{tag}] ");
    let end = header_end(lines);

    for i in 0..end {
        let Some(value) = header_value(&lines[i], "subject") else {
            continue;
        };
        if value.starts_with(&bracketed) {
            return;
        }
        lines[i] = if value.is_empty() {
            format!("Subject: {bracketed}(no subject)")
        } else {
            format!("Subject: {bracketed}{value}")
        };
        return;
    }

    lines.insert(end, format!("Subject: {bracketed}(no subject)"));
}

/// Marks the message as list traffic for the given recipient expression,
/// replacing any existing instances of the injected headers.
pub fn set_list_headers(lines: &mut Vec<String>, local_part: &str, domain: &str) {
    for name in ["precedence", "list-id", "list-post"] {
        remove_header(lines, name);
    }
    let end = header_end(lines);
    lines.splice(
        end..end,
        [
            "Precedence: list".to_string(),
            format!("List-Id: <{local_part}.mailingset.{domain}>"),
            format!("List-Post: <mailto:{local_part}@{domain}>"),
        ],
    );
}

/// Removes every instance of a header, folded continuations included.
fn remove_header(lines: &mut Vec<String>, name: &str) {
    let mut i = 0;
    while i < header_end(lines) {
        if header_value(&lines[i], name).is_some() {
            lines.remove(i);
            while i < header_end(lines) && lines[i].starts_with([' ', '\t']) {
                lines.remove(i);
            }
        } else {
            i += 1;
        }
    }
}

/// The value of the first `Subject` header, if any.
pub fn subject(lines: &[String]) -> Option<&str> {
    lines[..header_end(lines)]
        .iter()
        .find_map(|line| header_value(line, "subject"))
}

/// The value of the first `From` header, if any. Used to attribute the
/// message in logs next to the envelope sender.
pub fn from_header(lines: &[String]) -> Option<&str> {
    lines[..header_end(lines)]
        .iter()
        .find_map(|line| header_value(line, "from"))
}
