#![cfg(not(feature = "latex"))]

use lopdf::content::Content;
use lopdf::Document;
use predicates::prelude::*;
use std::fs;

#[test]
fn latex_feature_disabled_prints_equation_source() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("math.md");
    fs::write(&input, "$$\nE = mc^2\n$$\n").unwrap();

    assert_cmd::cargo::cargo_bin_cmd!("mathdown2pdf")
        .current_dir(dir.path())
        .arg("-p")
        .arg(&input)
        .arg("-f")
        .arg("math")
        .assert()
        .success()
        .stderr(predicate::str::contains("printed as source text"));

    let doc = Document::load(dir.path().join("math.pdf")).unwrap();
    let images = doc
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| s.dict.get(b"Subtype").and_then(|t| t.as_name()).ok() == Some(b"Image".as_slice()))
        .count();
    assert_eq!(images, 0);

    let page_id = doc.get_pages()[&1];
    let content = doc.get_page_content(page_id).unwrap();
    let words: Vec<Vec<u8>> = Content::decode(&content)
        .unwrap()
        .operations
        .into_iter()
        .filter_map(|op| match op.operator.as_str() {
            "Tj" => op.operands[0].as_str().ok().map(|s| s.to_vec()),
            "TJ" => op.operands[0].as_array().ok().map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().ok())
                    .flat_map(|s| s.iter().copied())
                    .collect()
            }),
            _ => None,
        })
        .collect();
    assert_eq!(
        words,
        vec![b"$$E".to_vec(), b"=".to_vec(), b"mc^2$$".to_vec()]
    );
}
