use super::{Key, Table, Value};
use std::fmt::Write;

/// First line of every file we write.
pub const PROVENANCE: &str = "-- we can read Lua syntax here!";
const INDENT: &str = "    ";

/// Encode a table the way the reader app dumps its own settings: the
/// provenance line, then `return` and the table with one entry per line.
/// Integer keys come first in numeric order, then named keys sorted by name.
pub fn encode(table: &Table) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(PROVENANCE);
    out.push_str("\nreturn ");
    write_table(&mut out, table, 0);
    out.push('\n');
    out
}

fn write_table(out: &mut String, table: &Table, depth: usize) {
    out.push_str("{\n");
    let mut entries: Vec<(&Key, &Value)> = table.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (key, value) in entries {
        out.push_str(&INDENT.repeat(depth + 1));
        match key {
            Key::Index(i) => {
                let _ = write!(out, "[{i}] = ");
            },
            Key::Name(name) => {
                out.push('[');
                write_string(out, name);
                out.push_str("] = ");
            },
        }
        write_value(out, value, depth + 1);
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        },
        Value::Float(f) => write_float(out, *f),
        Value::Str(s) => write_string(out, s),
        Value::Table(t) => write_table(out, t, depth),
    }
}

fn write_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("0/0");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "math.huge" } else { "-math.huge" });
    } else {
        let repr = f.to_string();
        out.push_str(&repr);
        if !repr.contains(['.', 'e', 'E']) {
            out.push_str(".0");
        }
    }
}

/// Quote a string. Newlines become a backslash followed by a real newline.
fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03}", c as u32);
            },
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut summary = Table::new();
        summary.insert("status", "complete");
        let mut table = Table::new();
        table.insert("summary", summary);
        table.insert("doc_path", "/mnt/ext1/a.epub");
        table.insert(1, true);
        assert_eq!(
            encode(&table),
            "-- we can read Lua syntax here!\nreturn {\n    [1] = true,\n    [\"doc_path\"] = \"/mnt/ext1/a.epub\",\n    [\"summary\"] = {\n        [\"status\"] = \"complete\",\n    },\n}\n"
        );
    }

    #[test]
    fn test_newlines_escape_and_restore() {
        let mut table = Table::new();
        table.insert("note", "first line\nsecond \"quoted\" line\\");
        let encoded = encode(&table);
        assert!(encoded.contains("\"first line\\\nsecond \\\"quoted\\\" line\\\\\""));
        let decoded = parse(&encoded).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_floats_stay_floats() {
        let mut table = Table::new();
        table.insert("whole", Value::Float(2.0));
        table.insert("part", Value::Float(0.125));
        let decoded = parse(&encode(&table)).unwrap();
        assert_eq!(decoded.get("whole"), Some(&Value::Float(2.0)));
        assert_eq!(decoded.get("part"), Some(&Value::Float(0.125)));
    }
}
