//! KFX fragment representation.
//!
//! A fragment is the fundamental unit of KFX content. Fragments carry either
//! Ion data (structured content) or raw bytes (media). Root fragments are
//! identified by their type alone and use `$<type>` as their id.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::ion::IonValue;
use super::symbols;

/// Fragment payload - Ion for structured data, Raw for media.
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentData {
    /// Ion-encoded structured data (metadata, storylines, styles, etc.)
    Ion(IonValue),
    /// Raw binary data (JPEG, PNG, TTF, etc.)
    Raw(Vec<u8>),
}

/// A KFX fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Fragment type (symbol ID like $260, $145, etc.)
    pub ftype: u32,
    /// Fragment ID (generated name, or `$<ftype>` for root fragments)
    pub fid: String,
    pub data: FragmentData,
}

impl Fragment {
    /// Create an entity fragment with Ion data.
    pub fn new(ftype: u32, fid: impl Into<String>, value: IonValue) -> Self {
        Self {
            ftype,
            fid: fid.into(),
            data: FragmentData::Ion(value),
        }
    }

    /// Create a fragment with raw binary data.
    pub fn raw(ftype: u32, fid: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            ftype,
            fid: fid.into(),
            data: FragmentData::Raw(bytes),
        }
    }

    /// Create a root fragment (fid equals the `$<ftype>` placeholder).
    pub fn root(ftype: u32, value: IonValue) -> Self {
        Self::new(ftype, root_id(ftype), value)
    }

    /// Root fragments reuse their type as their id.
    pub fn is_root(&self) -> bool {
        symbols::is_root(self.ftype) && self.fid == root_id(self.ftype)
    }

    pub fn is_singleton(&self) -> bool {
        symbols::is_singleton(self.ftype)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.data, FragmentData::Raw(_))
    }

    /// Listed in the entity map: neither root nor singleton nor a header fragment.
    pub fn is_entity(&self) -> bool {
        !self.is_root() && !self.is_singleton() && !symbols::is_container_fragment(self.ftype)
    }

    pub fn as_ion(&self) -> Option<&IonValue> {
        match &self.data {
            FragmentData::Ion(v) => Some(v),
            FragmentData::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match &self.data {
            FragmentData::Ion(_) => None,
            FragmentData::Raw(bytes) => Some(bytes),
        }
    }
}

/// Id used by root fragments of type `ftype`.
pub fn root_id(ftype: u32) -> String {
    format!("${ftype}")
}

/// Insertion-ordered fragment collection for one document.
///
/// Fragments are keyed by `(type, id)`: an anchor may share its id with a
/// section, but no two fragments of one type may.
#[derive(Debug, Default, Clone)]
pub struct FragmentList {
    fragments: Vec<Fragment>,
    by_key: HashMap<(u32, String), usize>,
}

impl FragmentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, rejecting a repeated `(type, id)` pair.
    pub fn push(&mut self, fragment: Fragment) -> Result<()> {
        let key = (fragment.ftype, fragment.fid.clone());
        if self.by_key.contains_key(&key) {
            return Err(Error::DuplicateFragment {
                ftype: fragment.ftype,
                fid: fragment.fid,
            });
        }
        self.by_key.insert(key, self.fragments.len());
        self.fragments.push(fragment);
        Ok(())
    }

    pub fn extend(&mut self, fragments: impl IntoIterator<Item = Fragment>) -> Result<()> {
        for fragment in fragments {
            self.push(fragment)?;
        }
        Ok(())
    }

    pub fn get(&self, ftype: u32, fid: &str) -> Option<&Fragment> {
        self.by_key
            .get(&(ftype, fid.to_string()))
            .map(|&i| &self.fragments[i])
    }

    pub fn contains(&self, ftype: u32, fid: &str) -> bool {
        self.get(ftype, fid).is_some()
    }

    /// Whether any fragment, of any type, carries `fid`.
    pub fn contains_id(&self, fid: &str) -> bool {
        self.fragments.iter().any(|f| f.fid == fid)
    }

    /// First fragment of a type; the way root fragments are looked up.
    pub fn first_of_type(&self, ftype: u32) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.ftype == ftype)
    }

    pub fn of_type(&self, ftype: u32) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(move |f| f.ftype == ftype)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.fragments.iter()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl<'a> IntoIterator for &'a FragmentList {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::symbols::sym;

    #[test]
    fn test_fragment_new() {
        let frag = Fragment::new(sym::SECTION, "c0", IonValue::Null);
        assert_eq!(frag.ftype, 260);
        assert_eq!(frag.fid, "c0");
        assert!(!frag.is_root());
        assert!(frag.is_entity());
        assert!(!frag.is_raw());
    }

    #[test]
    fn test_fragment_root() {
        let frag = Fragment::root(sym::METADATA, IonValue::Null);
        assert!(frag.is_root());
        assert!(frag.is_singleton());
        assert!(!frag.is_entity());
        assert_eq!(frag.fid, "$258");
    }

    #[test]
    fn test_resource_path_is_root_but_not_singleton() {
        let frag = Fragment::root(sym::RESOURCE_PATH, IonValue::Null);
        assert!(frag.is_root());
        assert!(!frag.is_singleton());
        assert!(!frag.is_entity());
    }

    #[test]
    fn test_fragment_raw() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        let frag = Fragment::raw(sym::RAW_MEDIA, "rsrc1", data.clone());
        assert!(frag.is_raw());
        assert_eq!(frag.as_raw(), Some(data.as_slice()));
        assert!(frag.as_ion().is_none());
    }

    #[test]
    fn test_same_id_different_types() {
        let mut list = FragmentList::new();
        list.push(Fragment::new(sym::SECTION, "c0", IonValue::Null)).unwrap();
        list.push(Fragment::new(sym::ANCHOR, "c0", IonValue::Null)).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(sym::ANCHOR, "c0").map(|f| f.ftype), Some(sym::ANCHOR));

        let err = list
            .push(Fragment::new(sym::SECTION, "c0", IonValue::Null))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFragment { ftype: 260, .. }));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_duplicate_root_rejected() {
        let mut list = FragmentList::new();
        list.push(Fragment::root(sym::DOCUMENT_DATA, IonValue::Null)).unwrap();
        assert!(list.push(Fragment::root(sym::DOCUMENT_DATA, IonValue::Null)).is_err());
    }

    #[test]
    fn test_lookup_preserves_order() {
        let mut list = FragmentList::new();
        list.extend([
            Fragment::new(sym::STYLE, "s1", IonValue::Null),
            Fragment::root(sym::METADATA, IonValue::Null),
            Fragment::new(sym::STYLE, "s2", IonValue::Null),
        ])
        .unwrap();
        let styles: Vec<&str> = list.of_type(sym::STYLE).map(|f| f.fid.as_str()).collect();
        assert_eq!(styles, ["s1", "s2"]);
        assert_eq!(list.first_of_type(sym::METADATA).map(|f| f.fid.as_str()), Some("$258"));
        assert!(list.contains(sym::STYLE, "s2"));
        assert!(!list.contains(sym::METADATA, "s2"));
        assert!(list.contains_id("$258"));
        assert_eq!(list.get(sym::STYLE, "s1").map(|f| f.fid.as_str()), Some("s1"));
    }
}
