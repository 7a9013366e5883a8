//! Image-folder dataset loader
//!
//! Loads `train/`, `dev/` and `test/` trees where every label has its own
//! directory of image files. The label set comes from the sorted directory
//! names under `train/`; `dev/` and `test/` may only use those labels.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::ImageReader;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{DataSplits, Example, LabelSet};
use crate::utils::error::{ClassifierError, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// Load all three splits from `root`
///
/// `train/` is required. A missing `dev/` or `test/` yields an empty split.
pub fn load_folder_splits(root: &Path, image_size: usize, channels: usize) -> Result<DataSplits> {
    if !root.exists() {
        return Err(ClassifierError::PathNotFound(root.to_path_buf()));
    }

    let train_dir = root.join("train");
    if !train_dir.is_dir() {
        return Err(ClassifierError::PathNotFound(train_dir));
    }

    let labels = LabelSet::new(class_dirs(&train_dir)?);
    if labels.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "no label directories found under {}",
            train_dir.display()
        )));
    }
    info!("Found {} labels", labels.len());

    let loader = FolderLoader {
        image_size,
        channels,
        labels: &labels,
    };

    let train = loader.load_split(&train_dir)?;
    let dev = loader.load_optional_split(&root.join("dev"))?;
    let test = loader.load_optional_split(&root.join("test"))?;

    Ok(DataSplits {
        train,
        dev,
        test,
        labels,
        shape: [channels, image_size, image_size],
    })
}

/// Sorted names of the immediate subdirectories of `dir`
fn class_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

struct FolderLoader<'a> {
    image_size: usize,
    channels: usize,
    labels: &'a LabelSet,
}

impl FolderLoader<'_> {
    fn load_optional_split(&self, dir: &Path) -> Result<Vec<Example>> {
        if dir.is_dir() {
            self.load_split(dir)
        } else {
            warn!("Split directory {} is missing, using an empty split", dir.display());
            Ok(Vec::new())
        }
    }

    fn load_split(&self, dir: &Path) -> Result<Vec<Example>> {
        let mut examples = Vec::new();

        for class_name in class_dirs(dir)? {
            let label = self.labels.index_of(&class_name).ok_or_else(|| {
                ClassifierError::Dataset(format!(
                    "label '{}' in {} is not present in train/",
                    class_name,
                    dir.display()
                ))
            })?;

            let class_dir = dir.join(&class_name);
            let paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_image(p))
                .collect();

            debug!("{}: {} images", class_dir.display(), paths.len());

            for path in paths {
                examples.push(Example::new(self.load_image(&path)?, label));
            }
        }

        info!("Loaded {} examples from {}", examples.len(), dir.display());
        Ok(examples)
    }

    /// Decode, resize and convert one image to CHW floats in [0, 1]
    fn load_image(&self, path: &Path) -> Result<Vec<f32>> {
        let img = ImageReader::open(path)
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| ClassifierError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .resize_exact(
                self.image_size as u32,
                self.image_size as u32,
                FilterType::Triangle,
            );

        let (height, width) = (self.image_size, self.image_size);

        if self.channels == 1 {
            return Ok(img
                .to_luma8()
                .into_raw()
                .into_iter()
                .map(|p| p as f32 / 255.0)
                .collect());
        }

        let rgb = img.to_rgb8();
        let mut image = vec![0.0f32; 3 * height * width];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                image[c * height * width + y * width + x] = pixel[c] as f32 / 255.0;
            }
        }
        Ok(image)
    }
}
