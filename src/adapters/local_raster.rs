use crate::domain::ports::RasterRepository;
use crate::utils::error::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Filesystem layout:
///
/// ```text
/// {root}/raw/{product}/{year}.tif          single yearly raster
/// {root}/raw/{product}/{year}/doy_###.tif  NDVI stack
/// ```
#[derive(Debug, Clone)]
pub struct LocalRasterRepository {
    root: PathBuf,
}

impl LocalRasterRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the per-timestep stack files.
    pub fn stack_dir(&self, product: &str, year: i32) -> PathBuf {
        self.root.join("raw").join(product).join(year.to_string())
    }
}

fn is_stack_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with("doy_") && name.ends_with(".tif"))
}

impl RasterRepository for LocalRasterRepository {
    fn raster_path(&self, product: &str, year: i32) -> PathBuf {
        self.root
            .join("raw")
            .join(product)
            .join(format!("{}.tif", year))
    }

    fn exists(&self, product: &str, year: i32) -> bool {
        self.raster_path(product, year).is_file()
    }

    fn list_stack_paths(&self, product: &str, year: i32) -> Result<Vec<PathBuf>> {
        let dir = self.stack_dir(product, year);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No stack directory at {}", dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_stack_file(&path) {
                paths.push(path);
            }
        }
        // zero-padded names, so lexical order is DOY order
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_raster_path_layout() {
        let repo = LocalRasterRepository::new("/data");
        assert_eq!(
            repo.raster_path("mcd12q2", 2020),
            PathBuf::from("/data/raw/mcd12q2/2020.tif")
        );
        assert!(!repo.exists("mcd12q2", 2020));
    }

    #[test]
    fn test_exists_for_yearly_raster() {
        let dir = TempDir::new().unwrap();
        let repo = LocalRasterRepository::new(dir.path());
        let path = repo.raster_path("p", 2021);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"").unwrap();
        assert!(repo.exists("p", 2021));
        assert!(!repo.exists("p", 2022));
    }

    #[test]
    fn test_list_stack_paths_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let repo = LocalRasterRepository::new(dir.path());
        let stack = repo.stack_dir("ndvi", 2020);
        fs::create_dir_all(&stack).unwrap();
        for name in ["doy_150.tif", "doy_001.tif", "doy_050.tif", "notes.txt", "ndvi.tif"] {
            fs::write(stack.join(name), b"").unwrap();
        }
        fs::create_dir_all(stack.join("doy_999.tif")).unwrap();

        let names: Vec<String> = repo
            .list_stack_paths("ndvi", 2020)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doy_001.tif", "doy_050.tif", "doy_150.tif"]);
    }

    #[test]
    fn test_missing_stack_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let repo = LocalRasterRepository::new(dir.path());
        assert!(repo.list_stack_paths("ndvi", 1999).unwrap().is_empty());
    }
}
