//! CSV fixtures for customer import tests

use std::io::Write;
use tempfile::NamedTempFile;

pub const HEADER: &str = "name,email,phoneNumber,aadhaarNumber,panNumber,state,city";

pub const JOHN_DOE: &str =
    "John Doe,john@x.com,9876543210,123456789012,ABCDE1234F,Karnataka,Bangalore";

/// Write a header line followed by `rows` to a temporary file
pub fn write_csv(rows: &[&str]) -> NamedTempFile {
    write_csv_bytes(rows.iter().map(|r| r.as_bytes()).collect::<Vec<_>>().as_slice())
}

/// [`write_csv`] for owned rows
pub fn write_rows(rows: &[String]) -> NamedTempFile {
    write_csv(&rows.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Like [`write_csv`] but rows may contain arbitrary bytes
pub fn write_csv_bytes(rows: &[&[u8]]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp csv");
    writeln!(file, "{HEADER}").expect("write header");
    for row in rows {
        file.write_all(row).expect("write row");
        file.write_all(b"\n").expect("write newline");
    }
    file.flush().expect("flush csv");
    file
}

/// A valid row whose fields are unique per `index`
pub fn valid_row(index: u32) -> String {
    format!(
        "Customer {},customer{}@example.com,98765{:05},{:012},ABCDE{:04}F,Maharashtra,Pune",
        letters(index),
        index,
        index,
        u64::from(index) + 100_000_000_000,
        index % 10_000,
    )
}

pub fn valid_rows(count: u32) -> Vec<String> {
    (0..count).map(valid_row).collect()
}

/// 0 -> "A", 25 -> "Z", 26 -> "BA"
fn letters(mut index: u32) -> String {
    let mut out = Vec::new();
    loop {
        out.push(char::from(b'A' + (index % 26) as u8));
        index /= 26;
        if index == 0 {
            break;
        }
    }
    out.iter().rev().collect()
}
