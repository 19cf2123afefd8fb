//! Oxford-IIIT Pet catalog
//!
//! Reads the published directory layout (`images/`, `annotations/`) and
//! turns the split lists into records the pipeline can load.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Published number of images in the trainval split
pub const TRAIN_COUNT: usize = 3680;

/// Published number of images in the test split
pub const TEST_COUNT: usize = 3669;

/// Number of breed classes
pub const NUM_CLASSES: u8 = 37;

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    /// Element count of this split as published with the dataset
    pub fn published_count(self) -> usize {
        match self {
            Split::Train => TRAIN_COUNT,
            Split::Test => TEST_COUNT,
        }
    }

    /// Annotation list file for this split
    pub fn annotation_file(self) -> &'static str {
        match self {
            Split::Train => "trainval.txt",
            Split::Test => "test.txt",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" | "trainval" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => Err(PipelineError::UnknownSplit { name: other.into() }),
        }
    }
}

/// Pet species as encoded in the annotation lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Species {
    Cat,
    Dog,
}

impl Species {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Species::Cat),
            2 => Some(Species::Dog),
            _ => None,
        }
    }
}

/// One image of the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetRecord {
    /// Image stem, e.g. `Abyssinian_100`
    pub name: String,
    /// Class id in `1..=37`
    pub class_id: u8,
    /// Cat or dog
    pub species: Species,
    /// Breed id within the species
    pub breed_id: u8,
    /// Absolute path of the image file
    pub image_path: PathBuf,
}

impl PetRecord {
    /// Parse one annotation line. Returns `Ok(None)` for blank and comment lines.
    pub fn parse_line(line: &str, images_dir: &Path) -> std::result::Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(format!("expected 4 fields, found {}", fields.len()));
        }

        let parse = |idx: usize, what: &str| -> std::result::Result<u8, String> {
            fields[idx]
                .parse::<u8>()
                .map_err(|_| format!("invalid {} '{}'", what, fields[idx]))
        };

        let class_id = parse(1, "class id")?;
        if class_id == 0 || class_id > NUM_CLASSES {
            return Err(format!("class id {} out of range 1..={}", class_id, NUM_CLASSES));
        }
        let species_code = parse(2, "species")?;
        let species = Species::from_code(species_code)
            .ok_or_else(|| format!("unknown species code {}", species_code))?;
        let breed_id = parse(3, "breed id")?;

        let name = fields[0].to_string();
        let image_path = images_dir.join(format!("{}.jpg", name));

        Ok(Some(Self {
            name,
            class_id,
            species,
            breed_id,
            image_path,
        }))
    }
}

/// Catalog metadata captured when the catalog is opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Dataset root
    pub root: PathBuf,
    /// Time the catalog was opened
    pub opened_at: chrono::DateTime<chrono::Utc>,
}

/// On-disk Oxford-IIIT Pet catalog
#[derive(Debug, Clone)]
pub struct PetCatalog {
    /// Dataset metadata
    pub metadata: DatasetMetadata,
    images_dir: PathBuf,
    annotations_dir: PathBuf,
    strict_counts: bool,
}

impl PetCatalog {
    /// Open a dataset root containing `images/` and `annotations/`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let images_dir = root.join("images");
        let annotations_dir = root.join("annotations");

        for dir in [&images_dir, &annotations_dir] {
            if !dir.is_dir() {
                return Err(PipelineError::DatasetNotFound {
                    path: root.clone(),
                    reason: format!("missing directory {}", dir.display()),
                });
            }
        }

        debug!("Opened Oxford-IIIT Pet catalog at {}", root.display());

        Ok(Self {
            metadata: DatasetMetadata {
                root,
                opened_at: chrono::Utc::now(),
            },
            images_dir,
            annotations_dir,
            strict_counts: false,
        })
    }

    /// Fail instead of warning when a split does not match its published size
    pub fn with_strict_counts(mut self, strict: bool) -> Self {
        self.strict_counts = strict;
        self
    }

    /// Directory holding the image files
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Load the records of a split in annotation order
    pub fn records(&self, split: Split) -> Result<Vec<PetRecord>> {
        let file = self.annotations_dir.join(split.annotation_file());
        let contents = std::fs::read_to_string(&file).map_err(|e| PipelineError::DatasetNotFound {
            path: file.clone(),
            reason: e.to_string(),
        })?;

        let mut records = Vec::with_capacity(split.published_count());
        for (idx, line) in contents.lines().enumerate() {
            match PetRecord::parse_line(line, &self.images_dir) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(reason) => {
                    return Err(PipelineError::AnnotationParse {
                        file: file.clone(),
                        line: idx + 1,
                        reason,
                    })
                }
            }
        }

        let expected = split.published_count();
        if records.len() != expected {
            if self.strict_counts {
                return Err(PipelineError::CountMismatch {
                    split: split.to_string(),
                    expected,
                    actual: records.len(),
                });
            }
            warn!(
                "Split {} has {} records, published count is {}",
                split,
                records.len(),
                expected
            );
        }

        debug!("Loaded {} records for split {}", records.len(), split);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parsing() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("TrainVal".parse::<Split>().unwrap(), Split::Train);
        assert_eq!(" test ".parse::<Split>().unwrap(), Split::Test);
        assert!("validation".parse::<Split>().is_err());
    }

    #[test]
    fn test_published_counts() {
        assert_eq!(Split::Train.published_count(), 3680);
        assert_eq!(Split::Test.published_count(), 3669);
    }

    #[test]
    fn test_parse_line() {
        let dir = Path::new("/data/images");
        let record = PetRecord::parse_line("Abyssinian_100 1 1 1", dir)
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "Abyssinian_100");
        assert_eq!(record.class_id, 1);
        assert_eq!(record.species, Species::Cat);
        assert_eq!(record.image_path, dir.join("Abyssinian_100.jpg"));

        let dog = PetRecord::parse_line("yorkshire_terrier_9 37 2 25", dir)
            .unwrap()
            .unwrap();
        assert_eq!(dog.species, Species::Dog);
        assert_eq!(dog.breed_id, 25);
    }

    #[test]
    fn test_parse_line_skips_comments() {
        let dir = Path::new("images");
        assert!(PetRecord::parse_line("#Image CLASS-ID SPECIES BREED ID", dir)
            .unwrap()
            .is_none());
        assert!(PetRecord::parse_line("   ", dir).unwrap().is_none());
    }

    #[test]
    fn test_parse_line_rejects_bad_fields() {
        let dir = Path::new("images");
        assert!(PetRecord::parse_line("Abyssinian_1 1 1", dir).is_err());
        assert!(PetRecord::parse_line("Abyssinian_1 x 1 1", dir).is_err());
        assert!(PetRecord::parse_line("Abyssinian_1 38 1 1", dir).is_err());
        assert!(PetRecord::parse_line("Abyssinian_1 1 3 1", dir).is_err());
    }
}
