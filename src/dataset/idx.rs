//! MNIST IDX reader
//!
//! Reads the big-endian IDX files distributed with MNIST:
//! images (magic 2051: count, rows, cols, then one byte per pixel) and
//! labels (magic 2049: count, then one byte per label).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{DataSplits, Example, LabelSet};
use crate::model::cnn::MIN_INPUT_SIZE;
use crate::utils::error::{ClassifierError, Result};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;
const NUM_DIGITS: usize = 10;

/// Locate `<stem>-<kind>-ubyte` or `<stem>.<kind>-ubyte` under `root`
pub fn find_idx_file(root: &Path, stem: &str, kind: &str) -> Option<PathBuf> {
    [
        format!("{stem}-{kind}-ubyte"),
        format!("{stem}.{kind}-ubyte"),
    ]
    .into_iter()
    .map(|name| root.join(name))
    .find(|path| path.is_file())
}

/// Load train/dev/test from the four MNIST files
///
/// The dev split is carved from the tail of the training file.
pub fn load_idx_splits(root: &Path, dev_size: usize) -> Result<DataSplits> {
    let (mut train, shape) = read_split(root, "train")?;
    let (test, test_shape) = read_split(root, "t10k")?;

    if shape != test_shape {
        return Err(ClassifierError::Dataset(format!(
            "train images are {:?} but test images are {:?}",
            shape, test_shape
        )));
    }
    let [_, rows, cols] = shape;
    if rows < MIN_INPUT_SIZE || cols < MIN_INPUT_SIZE {
        return Err(ClassifierError::Dataset(format!(
            "images are {rows}x{cols}, the network needs at least {MIN_INPUT_SIZE}x{MIN_INPUT_SIZE}"
        )));
    }
    if dev_size > train.len() {
        return Err(ClassifierError::Dataset(format!(
            "dev_size {} exceeds the {} training examples",
            dev_size,
            train.len()
        )));
    }

    let dev = train.split_off(train.len() - dev_size);
    let labels = LabelSet::new((0..NUM_DIGITS).map(|d| d.to_string()).collect());

    Ok(DataSplits {
        train,
        dev,
        test,
        labels,
        shape,
    })
}

fn read_split(root: &Path, stem: &str) -> Result<(Vec<Example>, [usize; 3])> {
    let images_path = find_idx_file(root, &format!("{stem}-images"), "idx3")
        .ok_or_else(|| ClassifierError::PathNotFound(root.join(format!("{stem}-images-idx3-ubyte"))))?;
    let labels_path = find_idx_file(root, &format!("{stem}-labels"), "idx1")
        .ok_or_else(|| ClassifierError::PathNotFound(root.join(format!("{stem}-labels-idx1-ubyte"))))?;

    let (images, rows, cols) = parse_images(&fs::read(&images_path)?)?;
    let labels = parse_labels(&fs::read(&labels_path)?)?;

    if images.len() != labels.len() {
        return Err(ClassifierError::Dataset(format!(
            "{} holds {} images but {} holds {} labels",
            images_path.display(),
            images.len(),
            labels_path.display(),
            labels.len()
        )));
    }

    debug!("Read {} {} examples of {}x{}", images.len(), stem, rows, cols);

    let examples = images
        .into_iter()
        .zip(labels)
        .map(|(image, label)| Example::new(image, label))
        .collect();

    Ok((examples, [1, rows, cols]))
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| ClassifierError::Dataset("IDX header truncated".to_string()))?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse an IDX image file into flat [0, 1] images
pub fn parse_images(data: &[u8]) -> Result<(Vec<Vec<f32>>, usize, usize)> {
    let mut offset = 0;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != IMAGES_MAGIC {
        return Err(ClassifierError::Dataset(format!(
            "bad IDX image magic {magic}, expected {IMAGES_MAGIC}"
        )));
    }

    let count = read_be_u32(data, &mut offset)? as usize;
    let rows = read_be_u32(data, &mut offset)? as usize;
    let cols = read_be_u32(data, &mut offset)? as usize;
    if rows == 0 || cols == 0 {
        return Err(ClassifierError::Dataset(format!(
            "IDX image file declares empty {rows}x{cols} images"
        )));
    }

    let pixels = rows.checked_mul(cols);
    let needed = pixels.and_then(|p| p.checked_mul(count));
    let (pixels, needed) = match (pixels, needed) {
        (Some(pixels), Some(needed)) => (pixels, needed),
        _ => {
            return Err(ClassifierError::Dataset(format!(
                "IDX image header {count} x {rows}x{cols} is too large"
            )))
        }
    };

    let body = &data[offset..];
    if body.len() < needed {
        return Err(ClassifierError::Dataset(format!(
            "IDX image file declares {} images of {}x{} but holds {} bytes",
            count,
            rows,
            cols,
            body.len()
        )));
    }

    let images = body
        .chunks_exact(pixels)
        .take(count)
        .map(|chunk| chunk.iter().map(|&p| p as f32 / 255.0).collect())
        .collect();

    Ok((images, rows, cols))
}

/// Parse an IDX label file
pub fn parse_labels(data: &[u8]) -> Result<Vec<usize>> {
    let mut offset = 0;
    let magic = read_be_u32(data, &mut offset)?;
    if magic != LABELS_MAGIC {
        return Err(ClassifierError::Dataset(format!(
            "bad IDX label magic {magic}, expected {LABELS_MAGIC}"
        )));
    }

    let count = read_be_u32(data, &mut offset)? as usize;
    let body = &data[offset..];
    if body.len() < count {
        return Err(ClassifierError::Dataset(format!(
            "IDX label file declares {} labels but holds {} bytes",
            count,
            body.len()
        )));
    }

    body[..count]
        .iter()
        .map(|&b| {
            let label = b as usize;
            if label < NUM_DIGITS {
                Ok(label)
            } else {
                Err(ClassifierError::Dataset(format!("label {label} is not a digit")))
            }
        })
        .collect()
}
