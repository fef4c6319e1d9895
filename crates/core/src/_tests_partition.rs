#![cfg(test)]

use super::configdoc::ConfigDocument;
use super::partition::{resolve, PartitionError};

#[test]
fn domain_and_processes_derive_atomic_block() {
    let res = resolve(Some([64, 64, 64]), None, Some(8)).unwrap();
    assert_eq!(res.domain, Some([64, 64, 64]));
    assert_eq!(res.grid, Some([2, 2, 2]));
    assert_eq!(res.atomic_block, Some([32.0, 32.0, 32.0]));
}

#[test]
fn domain_without_processes_is_missing_parameter() {
    let err = resolve(Some([64, 64, 64]), None, None).unwrap_err();
    assert!(matches!(err, PartitionError::MissingParameter(_)));
}

#[test]
fn atomic_block_and_processes_derive_domain() {
    // 32*32*32*8 = 2^18; the factor grid puts 2^6 = 64 on every axis.
    let res = resolve(None, Some([32.0, 32.0, 32.0]), Some(8)).unwrap();
    assert_eq!(res.domain, Some([64, 64, 64]));
    assert_eq!(res.grid, Some([2, 2, 2]));
    assert_eq!(res.atomic_block, Some([32.0, 32.0, 32.0]));
}

#[test]
fn domain_size_given_wins_over_atomic_block() {
    let res = resolve(Some([64, 64, 64]), Some([16.0, 16.0, 16.0]), Some(8)).unwrap();
    assert_eq!(res.domain, Some([64, 64, 64]));
    assert_eq!(res.atomic_block, Some([32.0, 32.0, 32.0]));
}

#[test]
fn nothing_to_derive_leaves_domain_unresolved() {
    let res = resolve(None, None, Some(8)).unwrap();
    assert_eq!(res.domain, None);
    assert_eq!(res.grid, Some([2, 2, 2]));

    let res = resolve(None, None, None).unwrap();
    assert_eq!(res.domain, None);
    assert_eq!(res.grid, None);
}

#[test]
fn zero_processes_is_rejected() {
    let err = resolve(Some([64, 64, 64]), None, Some(0)).unwrap_err();
    assert!(matches!(err, PartitionError::Precondition(_)));
}

#[test]
fn single_process_keeps_the_whole_domain() {
    let res = resolve(Some([48, 24, 12]), None, Some(1)).unwrap();
    assert_eq!(res.grid, Some([1, 1, 1]));
    assert_eq!(res.atomic_block, Some([48.0, 24.0, 12.0]));
}

#[test]
fn resolved_domain_is_written_to_the_document() {
    let mut doc = ConfigDocument::from_str("<hemocell>\n<domain>\n</domain>\n</hemocell>\n");
    let res = resolve(Some([64, 32, 16]), None, Some(4)).unwrap();
    res.write_domain(&mut doc);
    let text = doc.to_string();
    assert!(text.contains("\t<nx> 64 </nx>"));
    assert!(text.contains("\t<ny> 32 </ny>"));
    assert!(text.contains("\t<nz> 16 </nz>"));
}

#[test]
fn unresolved_domain_writes_nothing() {
    let original = "<hemocell>\n<domain>\n</domain>\n</hemocell>\n";
    let mut doc = ConfigDocument::from_str(original);
    let res = resolve(None, None, Some(4)).unwrap();
    res.write_domain(&mut doc);
    assert_eq!(doc.to_string(), original);
}
