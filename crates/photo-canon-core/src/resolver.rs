//! Groups fingerprinted records and picks one canonical representative per group.

use crate::hasher::Fingerprint;
use crate::model::{MediaRecord, Occurrence};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Total order used to choose the canonical occurrence of a piece of content:
/// preferred account first, then account name, then relative path (byte-wise,
/// case-sensitive), then absolute path so distinct files never compare equal.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalOrder<'a> {
    preferred_account: &'a str,
}

impl<'a> CanonicalOrder<'a> {
    pub fn new(preferred_account: &'a str) -> Self {
        Self { preferred_account }
    }

    pub fn compare<A, B>(&self, a: &A, b: &B) -> Ordering
    where
        A: Occurrence + ?Sized,
        B: Occurrence + ?Sized,
    {
        let a_rank = a.account() != self.preferred_account;
        let b_rank = b.account() != self.preferred_account;
        a_rank
            .cmp(&b_rank)
            .then_with(|| a.account().cmp(b.account()))
            .then_with(|| a.relative_path().cmp(b.relative_path()))
            .then_with(|| a.absolute_path().cmp(b.absolute_path()))
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub fingerprint: Fingerprint,
    pub canonical: MediaRecord,
    /// Remaining occurrences in canonical order.
    pub duplicates: Vec<MediaRecord>,
}

impl ResolvedGroup {
    pub fn occurrence_count(&self) -> usize {
        1 + self.duplicates.len()
    }

    pub fn into_records(self) -> impl Iterator<Item = MediaRecord> {
        std::iter::once(self.canonical).chain(self.duplicates)
    }
}

/// Group by fingerprint and resolve each group. Output is sorted by
/// fingerprint and independent of input order.
pub fn resolve(
    records: Vec<(MediaRecord, Fingerprint)>,
    order: CanonicalOrder<'_>,
) -> Vec<ResolvedGroup> {
    let mut groups: BTreeMap<Fingerprint, Vec<MediaRecord>> = BTreeMap::new();
    for (record, fingerprint) in records {
        groups.entry(fingerprint).or_default().push(record);
    }

    groups
        .into_iter()
        .filter_map(|(fingerprint, mut members)| {
            members.sort_by(|a, b| order.compare(a, b));
            members.dedup_by(|a, b| a.absolute_path == b.absolute_path);
            let mut members = members.into_iter();
            let canonical = members.next()?;
            Some(ResolvedGroup {
                fingerprint,
                canonical,
                duplicates: members.collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use std::path::PathBuf;

    fn record(account: &str, rel: &str) -> MediaRecord {
        let root = PathBuf::from(format!("/takeout/{}", account));
        MediaRecord {
            account: account.to_string(),
            absolute_path: root.join(rel),
            source_root: root,
            relative_path: rel.to_string(),
            extension: ".jpg".to_string(),
        }
    }

    #[test]
    fn test_preferred_account_wins() {
        let fp = hash_bytes(b"same");
        let groups = resolve(
            vec![
                (record("alice", "a.jpg"), fp.clone()),
                (record("bob", "z.jpg"), fp.clone()),
            ],
            CanonicalOrder::new("bob"),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].canonical.account, "bob");
        assert_eq!(groups[0].duplicates.len(), 1);
        assert_eq!(groups[0].duplicates[0].account, "alice");
        assert_eq!(groups[0].fingerprint, fp);
    }

    #[test]
    fn test_ties_broken_by_account_then_path() {
        let order = CanonicalOrder::new("zed");
        let a = record("alice", "b.jpg");
        let b = record("bob", "a.jpg");
        let c = record("alice", "B.jpg");
        assert_eq!(order.compare(&a, &b), Ordering::Less);
        // Case-sensitive: uppercase sorts before lowercase.
        assert_eq!(order.compare(&c, &a), Ordering::Less);
        assert_eq!(order.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_resolution_is_independent_of_input_order() {
        let fp = hash_bytes(b"dup");
        let other = hash_bytes(b"solo");
        let input = vec![
            (record("carol", "x/1.jpg"), fp.clone()),
            (record("alice", "y/2.jpg"), fp.clone()),
            (record("alice", "x/3.jpg"), fp.clone()),
            (record("bob", "solo.jpg"), other.clone()),
        ];
        let mut reversed = input.clone();
        reversed.reverse();

        let order = CanonicalOrder::new("carol");
        let first = resolve(input, order);
        let second = resolve(reversed, order);

        let summary = |groups: &[ResolvedGroup]| -> Vec<(String, String, Vec<String>)> {
            groups
                .iter()
                .map(|g| {
                    (
                        g.fingerprint.to_string(),
                        g.canonical.relative_path.clone(),
                        g.duplicates.iter().map(|d| d.relative_path.clone()).collect(),
                    )
                })
                .collect()
        };
        assert_eq!(summary(&first), summary(&second));

        let dup_group = first.iter().find(|g| g.fingerprint == fp).unwrap();
        assert_eq!(dup_group.canonical.account, "carol");
        assert_eq!(
            dup_group
                .duplicates
                .iter()
                .map(|d| d.relative_path.as_str())
                .collect::<Vec<_>>(),
            vec!["x/3.jpg", "y/2.jpg"]
        );
        let solo = first.iter().find(|g| g.fingerprint == other).unwrap();
        assert!(solo.duplicates.is_empty());
        assert_eq!(solo.occurrence_count(), 1);
    }
}
