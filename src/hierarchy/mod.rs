//! Folder/file/declaration hierarchy built from per-file scan results.
//!
//! Building is pure: the same set of results produces the same tree no matter
//! the order they are supplied in. Folders merge by name at each depth, files
//! of the same name within a folder merge their declarations, and every list
//! is kept in a canonical order.

use crate::cache::IndexCache;
use crate::oracle::Position;
use crate::paths;
use crate::types::{Declaration, Reference, SymbolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How declarations without references appear in the tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroReferencePolicy {
    /// Keep them, marked with `zeroReferences`
    #[default]
    Flag,
    /// Leave them out
    Suppress,
}

/// Declarations of one file, keyed by its project-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub relative_path: String,
    pub declarations: Vec<Declaration>,
}

impl FileResult {
    pub fn new(relative_path: impl Into<String>, declarations: Vec<Declaration>) -> Self {
        Self {
            relative_path: relative_path.into(),
            declarations,
        }
    }
}

/// A folder node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub name: String,
    /// Project-relative folder path, empty for the root
    pub path: String,
    /// References from this folder's files whose use site is in another folder
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub files: Vec<FileNode>,
    #[serde(default)]
    pub sub_folders: BTreeMap<String, HierarchyNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    /// References from this file whose use site is in another file of the same folder
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub symbols: Vec<SymbolNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolNode {
    pub position: Position,
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oracle_kind: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub zero_references: bool,
}

impl From<&Declaration> for SymbolNode {
    fn from(decl: &Declaration) -> Self {
        Self {
            position: decl.position,
            name: decl.name.clone(),
            kind: decl.kind,
            oracle_kind: decl.oracle_kind.clone(),
            references: decl.references.clone(),
            zero_references: decl.zero_references,
        }
    }
}

impl HierarchyNode {
    fn folder(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.sub_folders.is_empty()
    }

    /// Number of files in this folder and all subfolders
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .sub_folders
                .values()
                .map(HierarchyNode::file_count)
                .sum::<usize>()
    }

    /// Number of declarations in this folder and all subfolders
    pub fn symbol_count(&self) -> usize {
        self.files.iter().map(|f| f.symbols.len()).sum::<usize>()
            + self
                .sub_folders
                .values()
                .map(HierarchyNode::symbol_count)
                .sum::<usize>()
    }

    /// Look up a descendant folder by relative path (`qf/db`)
    pub fn folder_at(&self, path: &str) -> Option<&HierarchyNode> {
        path.split('/')
            .filter(|c| !c.is_empty())
            .try_fold(self, |node, name| node.sub_folders.get(name))
    }

    fn folder_mut(&mut self, components: &[&str]) -> &mut HierarchyNode {
        let mut node = self;
        let mut path = String::new();
        for name in components {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(name);
            node = node
                .sub_folders
                .entry(name.to_string())
                .or_insert_with(|| HierarchyNode::folder(name, &path));
        }
        node
    }

    fn canonicalize(&mut self) {
        self.references.sort();
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        for file in &mut self.files {
            file.references.sort();
            for symbol in &mut file.symbols {
                symbol.references.sort();
            }
            file.symbols.sort();
        }
        for folder in self.sub_folders.values_mut() {
            folder.canonicalize();
        }
    }

    /// Remove, bottom-up, folders without files or surviving subfolders
    fn prune(&mut self) {
        for folder in self.sub_folders.values_mut() {
            folder.prune();
        }
        self.sub_folders.retain(|name, folder| {
            let keep = !folder.is_empty();
            if !keep {
                tracing::trace!("Pruning empty folder {}", name);
            }
            keep
        });
    }
}

/// Builds hierarchies with a root name and zero-reference policy
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    root_name: String,
    policy: ZeroReferencePolicy,
    project_root: Option<PathBuf>,
}

impl HierarchyBuilder {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: ZeroReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compare use sites by their full project-relative location
    ///
    /// Without a project root, use sites are compared by folder and file
    /// name only.
    pub fn with_project_root(mut self, root: impl AsRef<Path>) -> Self {
        self.project_root = Some(paths::normalize(root.as_ref()));
        self
    }

    pub fn build<I>(&self, results: I) -> HierarchyNode
    where
        I: IntoIterator<Item = FileResult>,
    {
        let mut root = HierarchyNode::folder(&self.root_name, "");

        for result in results {
            self.insert(&mut root, result);
        }

        root.prune();
        root.canonicalize();
        tracing::debug!(
            "Built hierarchy with {} files and {} declarations",
            root.file_count(),
            root.symbol_count()
        );
        root
    }

    /// Build from every entry of the cache
    pub fn from_cache(&self, cache: &IndexCache) -> HierarchyNode {
        self.build(
            cache
                .entries()
                .map(|(_, entry)| FileResult::new(entry.path.clone(), entry.symbols.clone())),
        )
    }

    fn insert(&self, root: &mut HierarchyNode, result: FileResult) {
        let mut components: Vec<&str> = result
            .relative_path
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        let Some(file_name) = components.pop() else {
            return;
        };

        let folder = root.folder_mut(&components);
        let folder_path = components.join("/");
        let site = DeclarationSite {
            folder_path: &folder_path,
            folder_name: components.last().copied().unwrap_or(&self.root_name),
            file_path: &result.relative_path,
            file_name,
        };

        let index = match folder.files.iter().position(|f| f.name == file_name) {
            Some(index) => index,
            None => {
                folder.files.push(FileNode {
                    name: file_name.to_string(),
                    path: result.relative_path.clone(),
                    references: Vec::new(),
                    symbols: Vec::new(),
                });
                folder.files.len() - 1
            }
        };

        for decl in &result.declarations {
            if decl.zero_references && self.policy == ZeroReferencePolicy::Suppress {
                continue;
            }
            for reference in &decl.references {
                match self.locate(&site, reference) {
                    UseSite::OtherFolder => folder.references.push(reference.clone()),
                    UseSite::OtherFile => folder.files[index].references.push(reference.clone()),
                    UseSite::SameFile => {}
                }
            }
            folder.files[index].symbols.push(SymbolNode::from(decl));
        }
    }

    fn locate(&self, site: &DeclarationSite<'_>, reference: &Reference) -> UseSite {
        let relative = self.project_root.as_ref().and_then(|root| {
            (!reference.file_path.is_empty())
                .then(|| paths::relative_to(Path::new(&reference.file_path), root))
                .flatten()
        });

        let (same_folder, same_file) = match relative {
            Some(relative) => {
                let folder = relative.rsplit_once('/').map_or("", |(dir, _)| dir);
                (folder == site.folder_path, relative == site.file_path)
            }
            None => {
                let same_folder = reference.folder_name == site.folder_name;
                (same_folder, same_folder && reference.file_name == site.file_name)
            }
        };

        if !same_folder {
            UseSite::OtherFolder
        } else if !same_file {
            UseSite::OtherFile
        } else {
            UseSite::SameFile
        }
    }
}

struct DeclarationSite<'a> {
    folder_path: &'a str,
    folder_name: &'a str,
    file_path: &'a str,
    file_name: &'a str,
}

enum UseSite {
    OtherFolder,
    OtherFile,
    SameFile,
}

/// Build a hierarchy with an unnamed root and the default policy
pub fn build<I>(results: I) -> HierarchyNode
where
    I: IntoIterator<Item = FileResult>,
{
    HierarchyBuilder::default().build(results)
}

/// Build a hierarchy from all cache entries
pub fn from_cache(
    cache: &IndexCache,
    root_name: &str,
    policy: ZeroReferencePolicy,
) -> HierarchyNode {
    HierarchyBuilder::new(root_name)
        .with_policy(policy)
        .from_cache(cache)
}

#[cfg(test)]
mod tests;
