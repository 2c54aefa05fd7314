use canvas_nbgrader::course::{write_roster, RosterRow};
use std::fs;
use tempfile::TempDir;

fn row(id: u64, last: &str, first: &str, email: Option<&str>) -> RosterRow {
    RosterRow {
        id,
        last_name: last.to_string(),
        first_name: first.to_string(),
        email: email.map(String::from),
    }
}

#[test]
fn roster_csv_has_the_nbgrader_import_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("students.csv");

    let rows = vec![
        row(1, "Doe", "Jane", Some("jane@example.edu")),
        row(23, "Moe", "Jane", None),
    ];
    write_roster(&rows, &path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("id,last_name,first_name,email"));
    assert_eq!(lines.next(), Some("1,Doe,Jane,jane@example.edu"));
    assert_eq!(lines.next(), Some("23,Moe,Jane,"));
    assert_eq!(lines.next(), None);
}

#[test]
fn roster_csv_round_trips_through_a_csv_reader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("students.csv");

    let rows = vec![row(88, "van der Berg", "Anna", Some("anna@example.edu"))];
    write_roster(&rows, &path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][0], "88");
    assert_eq!(&records[0][1], "van der Berg");
    assert_eq!(&records[0][2], "Anna");
    assert_eq!(&records[0][3], "anna@example.edu");
}

#[test]
fn empty_roster_still_writes_the_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("students.csv");

    write_roster(&[], &path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim_end(), "id,last_name,first_name,email");
}
