use std::collections::BTreeMap;
use std::path::Path;
use vision_datasets::{iter, Dataset, DatasetKind, Mnist, Split};

const SHADES: [char; 5] = [' ', '.', '+', '*', '#'];

fn render(image: &[u8], cols: usize) -> String {
    let mut string = String::new();
    if cols == 0 {
        return string;
    }
    for row in image.chunks(cols) {
        for pixel in row {
            string.push(SHADES[*pixel as usize * (SHADES.len() - 1) / 255]);
        }
        string.push('\n');
    }
    string
}

/// Inspect an already fetched dataset, offline.
///
/// `cargo run --example inspect -- data/MNIST/raw mnist test`
fn main() {
    let raw_folder = std::env::args()
        .nth(1)
        .expect("Give the raw folder, e.g. data/MNIST/raw");
    let kind: DatasetKind = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "mnist".to_string())
        .parse()
        .unwrap();
    let split: Split = std::env::args()
        .nth(3)
        .unwrap_or_else(|| "train".to_string())
        .parse()
        .unwrap();

    let dataset = Mnist::load(Path::new(&raw_folder), kind, split).unwrap();
    println!("--{kind}/{split}--");
    println!("Count: {}", dataset.len());
    println!("Size: {}x{}", dataset.rows(), dataset.cols());

    let mut counts = BTreeMap::new();
    for item in iter(&dataset) {
        *counts.entry(item.label).or_insert(0usize) += 1;
    }
    for (label, count) in counts {
        let name = dataset.classes().get(label as usize).unwrap_or(&"?");
        println!("{label} ({name}): {count}");
    }

    if let Some(first) = dataset.get(0) {
        println!("");
        println!("First item, label {}:", first.label);
        print!("{}", render(&first.image, dataset.cols()));
    }
}
