//! Integration tests for merging sorted files

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use butterfly_stream::{
    zip_processors, Element, EntityMask, Input, FileFormat, Result, StreamProcessor, ZipStreams,
};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn keyed(tuples: Vec<Vec<Option<Element>>>) -> Vec<Vec<Option<String>>> {
    tuples
        .into_iter()
        .map(|t| t.into_iter().map(|s| s.map(|e| e.key().to_string())).collect())
        .collect()
}

#[test]
fn test_zip_two_files() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.opl", "n1 x0 y0\nn3 x0 y0\n");
    let b = write(&dir, "b.opl", "n2 x0 y0\nn3 x1 y1\n");

    let processors = vec![
        StreamProcessor::open(&a).unwrap(),
        StreamProcessor::open(&b).unwrap(),
    ];
    let tuples: Vec<_> = zip_processors(processors)
        .collect::<Result<_>>()
        .unwrap();

    let some = |k: &str| Some(k.to_string());
    assert_eq!(
        keyed(tuples),
        vec![
            vec![some("n1"), None],
            vec![None, some("n2")],
            vec![some("n3"), some("n3")],
        ]
    );
}

#[test]
fn test_every_key_appears_exactly_once() {
    let dir = TempDir::new().unwrap();
    let inputs = [
        "n1\nn4\nw1 Nn1\nr2 M\n",
        "n2\nn4\nw1 Nn4\nw7 Nn2\n",
        "n3\nw7 Nn3\nr1 M\nr2 M\n",
    ];
    let paths: Vec<PathBuf> = inputs
        .iter()
        .enumerate()
        .map(|(i, content)| write(&dir, &format!("{i}.opl"), content))
        .collect();

    let tuples: Vec<Vec<Option<Element>>> = zip_processors(
        paths.iter().map(|p| StreamProcessor::open(p).unwrap()),
    )
    .collect::<Result<_>>()
    .unwrap();

    let mut seen = BTreeSet::new();
    for tuple in &tuples {
        assert_eq!(tuple.len(), 3);
        let present: Vec<_> = tuple.iter().flatten().map(Element::key).collect();
        assert!(!present.is_empty());
        assert!(present.windows(2).all(|w| w[0] == w[1]));
        assert!(seen.insert(present[0]), "{} seen twice", present[0]);
    }
    // n1 n2 n3 n4 w1 w7 r1 r2
    assert_eq!(tuples.len(), 8);
    let order: Vec<String> = seen.iter().map(ToString::to_string).collect();
    assert_eq!(order, vec!["n1", "n2", "n3", "n4", "w1", "w7", "r1", "r2"]);
}

#[test]
fn test_zip_with_filtered_and_empty_streams() {
    let data = "n1\nn2\nw1 Nn1,n2\n";
    let nodes = StreamProcessor::open_with(
        Input::from_buffer(data, FileFormat::Opl),
        EntityMask::NODE,
    )
    .unwrap();
    let ways = StreamProcessor::open_with(
        Input::from_buffer(data, FileFormat::Opl),
        EntityMask::WAY,
    )
    .unwrap();
    let nothing = StreamProcessor::open_with(
        Input::from_buffer(data, FileFormat::Opl),
        EntityMask::NOTHING,
    )
    .unwrap();

    let tuples: Vec<_> = zip_processors([nodes, ways, nothing])
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(tuples.len(), 3);
    assert!(tuples.iter().all(|t| t[2].is_none()));
    assert!(tuples[2][0].is_none() && tuples[2][1].is_some());
}

#[test]
fn test_zip_of_nothing() {
    assert_eq!(zip_processors(Vec::new()).count(), 0);
    let streams: Vec<Vec<Result<Element>>> = vec![Vec::new(), Vec::new()];
    assert_eq!(ZipStreams::new(streams).count(), 0);
}

#[test]
fn test_read_error_after_returned_records() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.opl", "n1\nn2 xnope\nn3\n");
    let b = write(&dir, "b.opl", "n1\nn2\nn3\n");
    let mut zip = zip_processors([
        StreamProcessor::open(&a).unwrap(),
        StreamProcessor::open(&b).unwrap(),
    ]);
    let first = zip.next().unwrap().unwrap();
    assert_eq!(
        keyed(vec![first]),
        vec![vec![Some("n1".to_string()), Some("n1".to_string())]]
    );
    assert!(zip.next().unwrap().is_err());
    assert!(zip.next().is_none());
}
