//! Byte-level JSON scanning used to tell complete values from truncated ones
//! without allocating a `serde_json::Value`.

/// Deepest array/object nesting accepted; deeper input counts as incomplete.
const MAX_NESTING_DEPTH: usize = 128;

#[inline]
fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    let len = bytes.len();
    while i < len {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            _ => break,
        }
    }
    i
}

#[inline]
fn parse_json_string_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'"' {
        return Err(());
    }
    let mut i = start + 1;
    while i < len {
        match bytes[i] {
            b'"' => return Ok(i + 1),
            b'\\' => {
                i += 1;
                if i >= len {
                    return Err(());
                }
                i += 1;
            }
            0x00..=0x1F => return Err(()),
            _ => i += 1,
        }
    }
    Err(())
}

fn parse_value_end_at_depth(bytes: &[u8], start: usize, depth: usize) -> Result<usize, ()> {
    let i = skip_ws(bytes, start);
    if i >= bytes.len() {
        return Err(());
    }

    match bytes[i] {
        b'"' => parse_json_string_end(bytes, i),
        b'{' | b'[' if depth >= MAX_NESTING_DEPTH => Err(()),
        b'{' => parse_json_object_end(bytes, i, depth + 1),
        b'[' => parse_json_array_end(bytes, i, depth + 1),
        b't' => consume_literal(bytes, i, b"true"),
        b'f' => consume_literal(bytes, i, b"false"),
        b'n' => consume_literal(bytes, i, b"null"),
        b'-' | b'0'..=b'9' => parse_json_number_end(bytes, i),
        _ => Err(()),
    }
}

fn parse_json_object_end(bytes: &[u8], start: usize, depth: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'{' {
        return Err(());
    }
    let mut i = start + 1;
    loop {
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b'}' => return Ok(i + 1),
            b'"' => {}
            _ => return Err(()),
        }

        i = parse_json_string_end(bytes, i)?;
        i = skip_ws(bytes, i);
        if i >= len || bytes[i] != b':' {
            return Err(());
        }
        i = parse_value_end_at_depth(bytes, i + 1, depth)?;
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b',' => i += 1,
            b'}' => return Ok(i + 1),
            _ => return Err(()),
        }
    }
}

fn parse_json_array_end(bytes: &[u8], start: usize, depth: usize) -> Result<usize, ()> {
    let len = bytes.len();
    if start >= len || bytes[start] != b'[' {
        return Err(());
    }
    let mut i = start + 1;
    loop {
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        if bytes[i] == b']' {
            return Ok(i + 1);
        }

        i = parse_value_end_at_depth(bytes, i, depth)?;
        i = skip_ws(bytes, i);
        if i >= len {
            return Err(());
        }
        match bytes[i] {
            b',' => i += 1,
            b']' => return Ok(i + 1),
            _ => return Err(()),
        }
    }
}

#[inline]
fn consume_literal(bytes: &[u8], start: usize, lit: &[u8]) -> Result<usize, ()> {
    let end = start.checked_add(lit.len()).ok_or(())?;
    if end <= bytes.len() && &bytes[start..end] == lit {
        Ok(end)
    } else {
        Err(())
    }
}

#[inline]
fn parse_json_number_end(bytes: &[u8], start: usize) -> Result<usize, ()> {
    let len = bytes.len();
    let mut i = start;
    if i < len && bytes[i] == b'-' {
        i += 1;
    }

    if i >= len {
        return Err(());
    }
    match bytes[i] {
        b'0' => i += 1,
        b'1'..=b'9' => {
            i += 1;
            while i < len && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        _ => return Err(()),
    }

    if i < len && bytes[i] == b'.' {
        i += 1;
        if i >= len || !bytes[i].is_ascii_digit() {
            return Err(());
        }
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    if i < len && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < len && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        if i >= len || !bytes[i].is_ascii_digit() {
            return Err(());
        }
        while i < len && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }

    Ok(i)
}

/// True when `text` is exactly one complete JSON value, surrounding whitespace allowed.
#[must_use]
pub(crate) fn is_complete_json_value(text: &str) -> bool {
    let bytes = text.as_bytes();
    match parse_value_end_at_depth(bytes, 0, 0) {
        Ok(end) => skip_ws(bytes, end) == bytes.len(),
        Err(()) => false,
    }
}
