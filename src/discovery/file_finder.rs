use crate::config::Config;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use miette::{IntoDiagnostic, Result, WrapErr};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Type of input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Java,
    Manifest,
    /// XML under `res/<folder>/`
    Resource,
}

impl FileType {
    /// Determine file type from path
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        if file_name == "AndroidManifest.xml" {
            return Some(FileType::Manifest);
        }
        match path.extension()?.to_str()? {
            "java" => Some(FileType::Java),
            "xml" if is_resource_path(path) => Some(FileType::Resource),
            _ => None,
        }
    }
}

fn is_resource_path(path: &Path) -> bool {
    path.parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map_or(false, |name| name == "res")
}

/// A discovered input file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl SourceFile {
    pub fn new(path: PathBuf, file_type: FileType) -> Self {
        Self { path, file_type }
    }

    pub fn is_java(&self) -> bool {
        self.file_type == FileType::Java
    }

    /// Resource and manifest files, whose attributes are checked too
    pub fn is_xml(&self) -> bool {
        matches!(self.file_type, FileType::Resource | FileType::Manifest)
    }

    pub fn read_contents(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {}", self.path.display()))
    }
}

/// File finder for discovering Java sources, resources and manifests in a project
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Find all Java sources and manifests under the configured targets
    pub fn find_files(&self, root: &Path) -> Result<Vec<SourceFile>> {
        debug!("Scanning for files in: {}", root.display());

        let targets = if self.config.targets.is_empty() {
            vec![root.to_path_buf()]
        } else {
            self.config.targets.iter().map(|t| root.join(t)).collect()
        };

        let mut files: Vec<SourceFile> = targets
            .par_iter()
            .map(|target| self.scan_directory(target))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        debug!("Found {} files", files.len());
        Ok(files)
    }

    /// Scan a single directory (or a single file) for inputs
    fn scan_directory(&self, dir: &Path) -> Result<Vec<SourceFile>> {
        if !dir.exists() {
            warn!("Target does not exist: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut overrides = OverrideBuilder::new(dir);
        for pattern in &self.config.exclude {
            overrides
                .add(&format!("!{}", pattern))
                .into_diagnostic()
                .wrap_err_with(|| format!("Invalid exclude pattern: {}", pattern))?;
        }
        let overrides = overrides.build().into_diagnostic()?;

        let walker = WalkBuilder::new(dir)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .follow_links(false)
            .overrides(overrides)
            .build();

        Ok(walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();
                let file_type = FileType::from_path(path)?;
                trace!("Found {:?}: {}", file_type, path.display());
                Some(SourceFile::new(path.to_path_buf(), file_type))
            })
            .collect())
    }

    /// The manifest closest to the root, preferring `src/main/AndroidManifest.xml`
    pub fn find_manifest(files: &[SourceFile]) -> Option<&Path> {
        files
            .iter()
            .filter(|f| f.file_type == FileType::Manifest)
            .min_by_key(|f| {
                let main = f.path.ends_with("src/main/AndroidManifest.xml");
                (!main, f.path.components().count())
            })
            .map(|f| f.path.as_path())
    }
}

/// Counts of discovered files
#[derive(Debug, Default)]
pub struct FileStats {
    pub java_files: usize,
    pub manifest_files: usize,
    pub resource_files: usize,
}

impl FileStats {
    pub fn from_files(files: &[SourceFile]) -> Self {
        let mut stats = Self::default();
        for file in files {
            match file.file_type {
                FileType::Java => stats.java_files += 1,
                FileType::Manifest => stats.manifest_files += 1,
                FileType::Resource => stats.resource_files += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.java_files + self.manifest_files + self.resource_files
    }
}
