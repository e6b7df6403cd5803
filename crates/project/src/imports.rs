//! Discovery of the files a project textually imports.
//! 探索專案以文字方式匯入的外部檔案。
//!
//! [`MsBuildImportReader`] follows `<Import Project="..."/>` elements
//! depth-first in evaluation order. Only the part of MSBuild evaluation that
//! is needed to locate files is modelled: reserved `MSBuildThisFile*` /
//! `MSBuildProject*` properties, unconditional `<PropertyGroup>` entries and
//! environment variables. Conditions are not evaluated; a conditional import
//! is followed whenever its target exists on disk.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::util::normalize_path;

static PROPERTY_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\(([A-Za-z_][A-Za-z0-9_.\-]*)\)").expect("property reference pattern is valid")
});

/// Extracts the ordered list of files imported by a project.
/// 取得專案匯入檔案的有序清單。
pub trait ImportReader: Send + Sync {
    /// Returns absolute paths of every file imported (transitively) by `project`.
    fn import_paths(&self, project: &Path) -> Result<Vec<PathBuf>, ImportReadError>;

    /// Drops any project-model state cached across calls.
    fn unload_all(&self) {}
}

/// Errors raised while reading a project file.
/// 讀取專案檔時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ImportReadError {
    #[error("failed to read project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed project file {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Property { name: String, value: String },
    Import { project: String },
}

/// [`ImportReader`] for MSBuild project and targets files.
/// 針對 MSBuild 專案檔與 targets 檔的 [`ImportReader`] 實作。
#[derive(Debug, Default)]
pub struct MsBuildImportReader {
    cache: Mutex<HashMap<PathBuf, Arc<Vec<Directive>>>>,
}

impl MsBuildImportReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of parsed files currently held in the session cache.
    pub fn cached_files(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn directives(&self, path: &Path) -> Result<Arc<Vec<Directive>>, ImportReadError> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Arc::clone(hit));
        }

        let contents = fs::read_to_string(path).map_err(|source| ImportReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = Arc::new(parse_directives(&contents).map_err(|source| {
            ImportReadError::Xml {
                path: path.to_path_buf(),
                source,
            }
        })?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

impl ImportReader for MsBuildImportReader {
    fn import_paths(&self, project: &Path) -> Result<Vec<PathBuf>, ImportReadError> {
        let project = normalize_path(&project.to_string_lossy(), Path::new(""));
        let mut evaluation = Evaluation::new(&project);
        evaluation.visited.insert(project.clone());
        evaluation.evaluate(self, &project)?;
        Ok(evaluation.imports)
    }

    fn unload_all(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if !cache.is_empty() {
            log::debug!("unloading {} cached project files", cache.len());
        }
        cache.clear();
    }
}

struct Evaluation {
    properties: HashMap<String, String>,
    visited: HashSet<PathBuf>,
    imports: Vec<PathBuf>,
}

impl Evaluation {
    fn new(project: &Path) -> Self {
        let mut properties = HashMap::new();
        let directory = project.parent().unwrap_or_else(|| Path::new(""));
        properties.insert(
            "msbuildprojectdirectory".to_string(),
            directory.to_string_lossy().into_owned(),
        );
        properties.insert(
            "msbuildprojectfullpath".to_string(),
            project.to_string_lossy().into_owned(),
        );
        properties.insert(
            "msbuildprojectname".to_string(),
            file_stem(project),
        );
        properties.insert(
            "msbuildprojectfile".to_string(),
            file_name(project),
        );
        Self {
            properties,
            visited: HashSet::new(),
            imports: Vec::new(),
        }
    }

    fn evaluate(
        &mut self,
        reader: &MsBuildImportReader,
        file: &Path,
    ) -> Result<(), ImportReadError> {
        let directives = reader.directives(file)?;
        let directory = file.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

        for directive in directives.iter() {
            match directive {
                Directive::Property { name, value } => {
                    let expanded = self.expand(value, file);
                    self.properties.insert(name.to_lowercase(), expanded);
                }
                Directive::Import { project } => {
                    let expanded = self.expand(project, file);
                    if expanded.contains("$(") || expanded.contains('*') || expanded.contains('?')
                    {
                        log::debug!("skipping unresolved import '{expanded}' in {}", file.display());
                        continue;
                    }
                    let target = normalize_path(&expanded, &directory);
                    if !target.is_file() {
                        log::debug!(
                            "skipping missing import {} in {}",
                            target.display(),
                            file.display()
                        );
                        continue;
                    }
                    if !self.visited.insert(target.clone()) {
                        continue;
                    }
                    self.imports.push(target.clone());
                    match self.evaluate(reader, &target) {
                        Ok(()) => {}
                        Err(err) => log::warn!("ignoring imports of {}: {err}", target.display()),
                    }
                }
            }
        }
        Ok(())
    }

    fn expand(&self, raw: &str, current_file: &Path) -> String {
        PROPERTY_REF
            .replace_all(raw, |caps: &Captures<'_>| {
                let name = &caps[1];
                self.lookup(name, current_file)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn lookup(&self, name: &str, current_file: &Path) -> Option<String> {
        let key = name.to_lowercase();
        match key.as_str() {
            "msbuildthisfiledirectory" => {
                let mut directory = current_file
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .to_string_lossy()
                    .into_owned();
                if !directory.ends_with(std::path::MAIN_SEPARATOR) {
                    directory.push(std::path::MAIN_SEPARATOR);
                }
                Some(directory)
            }
            "msbuildthisfile" => Some(file_name(current_file)),
            "msbuildthisfilename" => Some(file_stem(current_file)),
            "msbuildthisfilefullpath" => Some(current_file.to_string_lossy().into_owned()),
            _ => self
                .properties
                .get(&key)
                .cloned()
                .or_else(|| std::env::var(name).ok()),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn has_condition(element: &BytesStart<'_>) -> bool {
    element
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"Condition")
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn import_directive(element: &BytesStart<'_>) -> Result<Option<Directive>, quick_xml::Error> {
    if attribute(element, b"Sdk")?.is_some() {
        return Ok(None);
    }
    Ok(attribute(element, b"Project")?
        .filter(|project| !project.trim().is_empty())
        .map(|project| Directive::Import {
            project: project.trim().to_string(),
        }))
}

/// Walks the XML once, keeping imports and unconditional properties in
/// document order.
fn parse_directives(contents: &str) -> Result<Vec<Directive>, quick_xml::Error> {
    let contents = contents.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(contents);
    reader.trim_text(true);

    let mut directives = Vec::new();
    let mut depth = 0usize;
    // Depth of an unconditional <PropertyGroup>, while inside one.
    let mut property_group: Option<usize> = None;
    let mut property: Option<(String, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                depth += 1;
                let name = element.local_name();
                match (name.as_ref(), property_group) {
                    (b"PropertyGroup", None) if !has_condition(&element) => {
                        property_group = Some(depth);
                    }
                    (b"Import", _) => {
                        if let Some(directive) = import_directive(&element)? {
                            directives.push(directive);
                        }
                    }
                    (_, Some(group_depth)) if depth == group_depth + 1 => {
                        if !has_condition(&element) {
                            let key = String::from_utf8_lossy(name.as_ref()).into_owned();
                            property = Some((key, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(element) => {
                let name = element.local_name();
                match (name.as_ref(), property_group) {
                    (b"Import", _) => {
                        if let Some(directive) = import_directive(&element)? {
                            directives.push(directive);
                        }
                    }
                    (_, Some(group_depth)) if depth == group_depth => {
                        if !has_condition(&element) {
                            directives.push(Directive::Property {
                                name: String::from_utf8_lossy(name.as_ref()).into_owned(),
                                value: String::new(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if let Some((_, value)) = property.as_mut() {
                    value.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some((_, value)) = property.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                match property_group {
                    Some(group_depth) if depth == group_depth + 1 => {
                        if let Some((name, value)) = property.take() {
                            directives.push(Directive::Property {
                                name,
                                value: value.trim().to_string(),
                            });
                        }
                    }
                    Some(group_depth) if depth == group_depth => property_group = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(directives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn parses_imports_and_unconditional_properties() {
        let directives = parse_directives(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Project xmlns="http://schemas.microsoft.com/developer/msbuild/2003">
  <PropertyGroup>
    <BuildRoot>$(MSBuildThisFileDirectory)..\build</BuildRoot>
    <Skipped Condition="'$(Configuration)' == 'Debug'">x</Skipped>
  </PropertyGroup>
  <PropertyGroup Condition="false">
    <Ignored>y</Ignored>
  </PropertyGroup>
  <Import Project="$(BuildRoot)\common.props" />
  <Import Sdk="Microsoft.NET.Sdk" Project="Sdk.props" />
  <ImportGroup>
    <Import Project="local.targets" Condition="Exists('local.targets')" />
  </ImportGroup>
</Project>"#,
        )
        .unwrap();

        assert_eq!(
            directives,
            vec![
                Directive::Property {
                    name: "BuildRoot".into(),
                    value: r"$(MSBuildThisFileDirectory)..\build".into(),
                },
                Directive::Import {
                    project: r"$(BuildRoot)\common.props".into(),
                },
                Directive::Import {
                    project: "local.targets".into(),
                },
            ]
        );
    }

    #[test]
    fn follows_imports_transitively_in_evaluation_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("src/app/app.proj"),
            r#"<Project>
  <PropertyGroup><Shared>$(MSBuildThisFileDirectory)..\..\build</Shared></PropertyGroup>
  <Import Project="$(Shared)\first.props" />
  <Import Project="..\..\build\second.targets" />
  <Import Project="missing.props" />
  <Import Project="$(Undefined)\never.props" />
</Project>"#,
        );
        write(
            &root.join("build/first.props"),
            r#"<Project><Import Project="$(MSBuildThisFileDirectory)nested.props" /></Project>"#,
        );
        write(&root.join("build/nested.props"), "<Project />");
        write(
            &root.join("build/second.targets"),
            r#"<Project><Import Project="first.props" /></Project>"#,
        );

        let reader = MsBuildImportReader::new();
        let imports = reader.import_paths(&root.join("src/app/app.proj")).unwrap();
        assert_eq!(
            imports,
            vec![
                root.join("build/first.props"),
                root.join("build/nested.props"),
                root.join("build/second.targets"),
            ]
        );
    }

    #[test]
    fn import_cycles_terminate() {
        let dir = tempdir().unwrap();
        write(
            &dir.path().join("a.props"),
            r#"<Project><Import Project="b.props" /></Project>"#,
        );
        write(
            &dir.path().join("b.props"),
            r#"<Project><Import Project="a.props" /></Project>"#,
        );
        write(
            &dir.path().join("main.proj"),
            r#"<Project><Import Project="a.props" /></Project>"#,
        );

        let reader = MsBuildImportReader::new();
        let imports = reader.import_paths(&dir.path().join("main.proj")).unwrap();
        assert_eq!(
            imports,
            vec![dir.path().join("a.props"), dir.path().join("b.props")]
        );
    }

    #[test]
    fn unload_all_clears_the_session_cache() {
        let dir = tempdir().unwrap();
        write(
            &dir.path().join("main.proj"),
            r#"<Project><Import Project="shared.props" /></Project>"#,
        );
        write(&dir.path().join("shared.props"), "<Project />");

        let reader = MsBuildImportReader::new();
        reader.import_paths(&dir.path().join("main.proj")).unwrap();
        assert_eq!(reader.cached_files(), 2);

        reader.unload_all();
        assert_eq!(reader.cached_files(), 0);
    }

    #[test]
    fn missing_project_is_an_io_error() {
        let dir = tempdir().unwrap();
        let reader = MsBuildImportReader::new();
        let err = reader
            .import_paths(&dir.path().join("absent.proj"))
            .unwrap_err();
        assert!(matches!(err, ImportReadError::Io { .. }));
    }
}
