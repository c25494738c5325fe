use gopt::deck::{parse_deck, read_deck, ParseError};
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

const THREE_JOBS: &str = "\
%chk=formaldehyde.chk
%nprocshared=8
%mem=8GB
#P B3LYP/6-31G(d) freq

formaldehyde frequencies

0 1
C    0.000000    0.000000   -0.529
O    0.000000    0.000000    0.677
H    0.000000    0.935      -1.112
H    0.000000   -0.935      -1.112

--Link1--
%chk=formaldehyde.chk
%nprocshared=8
#P B3LYP/6-31G(d) opt=(ts,noeigentest,calcfc) geom=check guess=read

--Link1--
%chk=formaldehyde.chk
#P B3LYP/6-31G(d) opt=modredundant

relaxed scan

0 1
C    0.000000    0.000000   -0.529
O    0.000000    0.000000    0.677

1 2 S 10 0.05

";

#[test]
fn test_read_deck_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("formaldehyde.com");
    let mut file = File::create(&path).unwrap();
    write!(file, "{}", THREE_JOBS).unwrap();

    let jobs = read_deck(&path).unwrap();
    assert_eq!(jobs.len(), 3);
    let rebuilt: String = jobs.iter().map(|job| job.to_string()).collect();
    assert_eq!(rebuilt, THREE_JOBS);
}

#[test]
fn test_classification_of_parsed_jobs() {
    let jobs = parse_deck(THREE_JOBS).unwrap();
    assert!(jobs[0].is_frequency() && !jobs[0].is_optimization());
    assert!(jobs[1].is_optimization() && !jobs[1].is_frequency());
    assert!(jobs[2].is_optimization());
    assert_eq!(jobs[2].trailer, "\n1 2 S 10 0.05\n\n");

    // pure functions of the route: asking twice gives the same answer
    for job in &jobs {
        assert_eq!(job.is_optimization(), job.is_optimization());
        assert_eq!(job.kind(), job.clone().kind());
    }
}

#[test]
fn test_checkpoint_geometry_invariant() {
    for job in parse_deck(THREE_JOBS).unwrap() {
        assert_eq!(job.annotation.is_empty(), job.geometry.is_empty());
        assert_eq!(job.annotation.is_empty(), job.reads_checkpoint_geometry());
    }
}

#[test]
fn test_truncated_coordinates_report_line() {
    let deck = "#P HF/3-21G opt\n\nwater\n\n0 1\nO 0 0 0\nH 0 0 0.96";
    match parse_deck(deck) {
        Err(ParseError::Structural { line, section }) => {
            // seven lines were read; the blank line ending the geometry
            // would have been line 8
            assert_eq!(line, 8);
            assert_eq!(section, "molecule specification");
        }
        other => panic!("expected a structural error, got {:?}", other),
    }
}

#[test]
fn test_truncated_second_job_reports_deck_line() {
    let deck = "#P HF/3-21G sp\n\nt\n\n0 1\nHe 0 0 0\n\n--Link1--\n#P HF/3-21G opt\n\nt2\n";
    let err = parse_deck(deck).unwrap_err();
    assert!(matches!(err, ParseError::Structural { line: 12, .. }));
    assert_eq!(
        err.to_string(),
        "Unexpected end of file found: 12 (while reading title section)"
    );
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let result = read_deck(&dir.path().join("absent.com"));
    assert!(matches!(result, Err(ParseError::Io(_))));
}
