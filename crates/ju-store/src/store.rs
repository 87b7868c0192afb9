//! Store files, groups, and explicit group handles.
//!
//! A store is a tree of groups; each group holds named objects and named
//! subgroups. Navigation never relies on a "current directory": opening a
//! group returns a handle ([`Group`] / [`GroupMut`]) that is passed along
//! explicitly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ju_core::{Error, Hist1D, Hist2D, Result};
use serde::{Deserialize, Serialize};

use crate::object::StoredObject;
use crate::table::EventTable;

/// Format tag written at the top of every store file.
pub const STORE_FORMAT: &str = "jetunfold-store";
/// Current store format version.
pub const STORE_VERSION: u32 = 1;

/// One group: named objects plus named subgroups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    objects: BTreeMap<String, StoredObject>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, Node>,
}

#[derive(Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    root: Node,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    root: &'a Node,
}

/// A store file held in memory.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    root: Node,
}

impl Store {
    /// Open an existing store for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!("store file {}", path.display())));
        }
        let reader = BufReader::new(File::open(path)?);
        let env: Envelope = serde_json::from_reader(reader)?;
        if env.format != STORE_FORMAT {
            return Err(Error::Validation(format!(
                "{}: unexpected format tag '{}'",
                path.display(),
                env.format
            )));
        }
        if env.version > STORE_VERSION {
            return Err(Error::Validation(format!(
                "{}: store version {} is newer than supported {}",
                path.display(),
                env.version,
                STORE_VERSION
            )));
        }
        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self { path: path.to_path_buf(), root: env.root })
    }

    /// Start a new, empty store; nothing touches the disk until [`Store::save`].
    pub fn create(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), root: Node::default() }
    }

    /// File this store reads from / writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read handle on the top-level group.
    pub fn root(&self) -> Group<'_> {
        Group { node: &self.root, path: String::new() }
    }

    /// Write handle on the top-level group.
    pub fn root_mut(&mut self) -> GroupMut<'_> {
        GroupMut { node: &mut self.root, path: String::new() }
    }

    /// Write the whole tree to [`Store::path`] (replacing any previous file).
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.partial");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(
                &mut w,
                &EnvelopeRef { format: STORE_FORMAT, version: STORE_VERSION, root: &self.root },
            )?;
            w.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "store saved");
        Ok(())
    }
}

/// Read handle on one group.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    node: &'a Node,
    path: String,
}

impl<'a> Group<'a> {
    /// Slash-separated path of this group ("" for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Open subgroup `name`.
    pub fn cd(&self, name: &str) -> Result<Group<'a>> {
        let path = join(&self.path, name);
        match self.node.groups.get(name) {
            Some(node) => Ok(Group { node, path }),
            None => Err(Error::NotFound(format!("group '{path}'"))),
        }
    }

    /// Open a nested group by slash-separated path.
    pub fn cd_path(&self, path: &str) -> Result<Group<'a>> {
        let mut cur = self.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = cur.cd(part)?;
        }
        Ok(cur)
    }

    /// All keys (subgroups and objects), sorted.
    pub fn keys(&self) -> Vec<&'a str> {
        let mut k: Vec<&'a str> = self
            .node
            .groups
            .keys()
            .chain(self.node.objects.keys())
            .map(String::as_str)
            .collect();
        k.sort_unstable();
        k
    }

    /// Subgroup names, sorted.
    pub fn group_names(&self) -> Vec<&'a str> {
        self.node.groups.keys().map(String::as_str).collect()
    }

    /// Object names, sorted.
    pub fn object_names(&self) -> Vec<&'a str> {
        self.node.objects.keys().map(String::as_str).collect()
    }

    /// Object `name`.
    pub fn get(&self, name: &str) -> Result<&'a StoredObject> {
        self.node
            .objects
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("object '{}'", join(&self.path, name))))
    }

    /// 1D histogram `name`.
    pub fn hist1d(&self, name: &str) -> Result<&'a Hist1D> {
        self.get(name)?.as_hist1d()
    }

    /// 2D histogram `name`.
    pub fn hist2d(&self, name: &str) -> Result<&'a Hist2D> {
        self.get(name)?.as_hist2d()
    }

    /// Event table `name`.
    pub fn table(&self, name: &str) -> Result<&'a EventTable> {
        self.get(name)?.as_table()
    }

    /// First table (in key order) whose name satisfies `pred`.
    pub fn find_table(&self, pred: impl Fn(&str) -> bool) -> Result<&'a EventTable> {
        self.node
            .objects
            .iter()
            .filter(|(name, _)| pred(name.as_str()))
            .find_map(|(_, obj)| obj.as_table().ok())
            .ok_or_else(|| {
                Error::NotFound(format!("no matching table in group '{}'", self.path))
            })
    }
}

/// Write handle on one group.
#[derive(Debug)]
pub struct GroupMut<'a> {
    node: &'a mut Node,
    path: String,
}

impl GroupMut<'_> {
    /// Slash-separated path of this group.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create subgroup `name` (or reopen it if it exists).
    pub fn mkdir(&mut self, name: &str) -> Result<GroupMut<'_>> {
        validate_key(name)?;
        let path = join(&self.path, name);
        let node = self.node.groups.entry(name.to_string()).or_default();
        Ok(GroupMut { node, path })
    }

    /// Write `object` under its own name, replacing any object of that name.
    pub fn write(&mut self, object: impl Into<StoredObject>) -> Result<()> {
        let object = object.into();
        let name = object.name().to_string();
        self.write_as(&name, object)
    }

    /// Write `object` under `name`.
    pub fn write_as(&mut self, name: &str, object: impl Into<StoredObject>) -> Result<()> {
        validate_key(name)?;
        self.node.objects.insert(name.to_string(), object.into());
        Ok(())
    }

    /// Read view of this group.
    pub fn as_group(&self) -> Group<'_> {
        Group { node: self.node, path: self.path.clone() }
    }
}

fn validate_key(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::Validation(format!("invalid store key '{name}'")));
    }
    Ok(())
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() { name.to_string() } else { format!("{parent}/{name}") }
}
