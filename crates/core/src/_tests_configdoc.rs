#![cfg(test)]

use super::configdoc::ConfigDocument;

const SAMPLE: &str = "\
<hemocell>
<domain>
\t<nx> 32 </nx>
\t<ny> 32 </ny>
</domain>
<sim>
\t<tmax> 100 </tmax>
</sim>
</hemocell>
";

#[test]
fn existing_field_is_replaced_in_place() {
    let mut doc = ConfigDocument::from_str(SAMPLE);
    doc.set_or_insert("domain", "nx", 64);
    let text = doc.to_string();
    assert!(text.contains("\t<nx> 64 </nx>"));
    assert!(!text.contains("<nx> 32 </nx>"));
    // untouched lines survive verbatim
    assert!(text.contains("\t<ny> 32 </ny>"));
    assert!(text.contains("\t<tmax> 100 </tmax>"));
}

#[test]
fn missing_field_is_inserted_after_root_tag() {
    let mut doc = ConfigDocument::from_str(SAMPLE);
    doc.set_or_insert("domain", "nz", 16);
    let lines = doc.lines();
    let root = lines.iter().position(|l| l.contains("<domain>")).unwrap();
    assert_eq!(lines[root + 1], "\t<nz> 16 </nz>");
}

#[test]
fn missing_root_appends_block_before_final_line() {
    let mut doc = ConfigDocument::from_str(SAMPLE);
    doc.set_or_insert("benchmark", "FLIfluid", 0.5);
    let lines = doc.lines();
    let n = lines.len();
    assert_eq!(lines[n - 1], "</hemocell>");
    assert_eq!(lines[n - 2], "");
    assert_eq!(lines[n - 3], "</benchmark>");
    assert_eq!(lines[n - 4], "\t<FLIfluid> 0.5 </FLIfluid>");
    assert_eq!(lines[n - 5], "<benchmark>");
}

#[test]
fn repeated_write_is_byte_identical() {
    let mut doc = ConfigDocument::from_str(SAMPLE);
    doc.set_or_insert("sim", "tmax", 500);
    let once = doc.to_string();
    doc.set_or_insert("sim", "tmax", 500);
    assert_eq!(doc.to_string(), once);
}

#[test]
fn repeated_insert_of_new_root_is_byte_identical() {
    let mut doc = ConfigDocument::from_str(SAMPLE);
    doc.set_or_insert("benchmark", "FLIpart", 2);
    let once = doc.to_string();
    doc.set_or_insert("benchmark", "FLIpart", 2);
    assert_eq!(doc.to_string(), once);
}

#[test]
fn untouched_document_round_trips() {
    let doc = ConfigDocument::from_str(SAMPLE);
    assert_eq!(doc.to_string(), SAMPLE);
}
