//! Pure walks over the flat parent-pointer table. Each operation takes the
//! full folder set fetched once and builds an in-memory adjacency map
//! instead of issuing one query per node.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use uuid::Uuid;

use crate::folders::repo::Folder;

#[derive(Debug, Serialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: Folder,
    pub children: Vec<FolderNode>,
}

/// One breadcrumb step of a folder path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSegment {
    pub id: Uuid,
    pub name: String,
}

/// Builds the forest from the flat table. Folders whose parent id is null
/// or does not resolve become roots. Sibling order follows the input
/// order (creation time ascending).
pub fn build_forest(folders: Vec<Folder>) -> Vec<FolderNode> {
    let ids: HashSet<Uuid> = folders.iter().map(|f| f.id).collect();
    let mut children_of: HashMap<Uuid, Vec<Folder>> = HashMap::new();
    let mut roots = Vec::new();

    for folder in folders {
        match folder.parent_id {
            Some(parent) if ids.contains(&parent) => {
                children_of.entry(parent).or_default().push(folder);
            }
            _ => roots.push(folder),
        }
    }

    fn attach(folder: Folder, children_of: &mut HashMap<Uuid, Vec<Folder>>) -> FolderNode {
        let children = children_of
            .remove(&folder.id)
            .unwrap_or_default()
            .into_iter()
            .map(|child| attach(child, children_of))
            .collect();
        FolderNode { folder, children }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut children_of))
        .collect()
}

/// Every folder below `id`, computed by a breadth-first walk.
pub fn descendant_ids(folders: &[Folder], id: Uuid) -> HashSet<Uuid> {
    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for folder in folders {
        if let Some(parent) = folder.parent_id {
            children_of.entry(parent).or_default().push(folder.id);
        }
    }

    let mut descendants = HashSet::new();
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        for &child in children_of.get(&current).into_iter().flatten() {
            if descendants.insert(child) {
                queue.push_back(child);
            }
        }
    }
    descendants
}

#[derive(Debug, PartialEq, Eq)]
pub enum MoveError {
    /// `new_parent_id == id`.
    SelfParent,
    /// The target parent sits below the folder being moved.
    CircularReference,
}

/// The cycle guard applied to every parent-pointer write.
pub fn validate_move(
    folders: &[Folder],
    id: Uuid,
    new_parent_id: Option<Uuid>,
) -> Result<(), MoveError> {
    let Some(new_parent_id) = new_parent_id else {
        return Ok(()); // moving to root can never create a cycle
    };
    if new_parent_id == id {
        return Err(MoveError::SelfParent);
    }
    if descendant_ids(folders, id).contains(&new_parent_id) {
        return Err(MoveError::CircularReference);
    }
    Ok(())
}

/// Walks parent pointers upward from `id` to a root, prepending each step.
/// Returns `None` when any id along the chain does not resolve. The step
/// count is bounded by the folder count, so the walk terminates even on
/// corrupt data.
pub fn resolve_path(folders: &[Folder], id: Uuid) -> Option<Vec<PathSegment>> {
    let by_id: HashMap<Uuid, &Folder> = folders.iter().map(|f| (f.id, f)).collect();
    let mut path = Vec::new();
    let mut current = Some(id);
    let mut steps = 0;

    while let Some(current_id) = current {
        if steps > folders.len() {
            return None;
        }
        steps += 1;
        let folder = by_id.get(&current_id)?;
        path.insert(
            0,
            PathSegment {
                id: folder.id,
                name: folder.name.clone(),
            },
        );
        current = folder.parent_id;
    }
    Some(path)
}

/// Trimmed folder name, validated to 1–100 characters.
pub fn validate_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Folder name is required".into());
    }
    if name.chars().count() > 100 {
        return Err("Folder name must be at most 100 characters".into());
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn folder(id: u128, parent: Option<u128>) -> Folder {
        Folder {
            id: Uuid::from_u128(id),
            name: format!("f{}", id),
            parent_id: parent.map(Uuid::from_u128),
            admin_id: Uuid::from_u128(999),
            created_at: OffsetDateTime::from_unix_timestamp(id as i64).unwrap(),
            updated_at: OffsetDateTime::from_unix_timestamp(id as i64).unwrap(),
        }
    }

    //      1         4
    //     / \
    //    2   3
    //        |
    //        5
    fn sample() -> Vec<Folder> {
        vec![
            folder(1, None),
            folder(2, Some(1)),
            folder(3, Some(1)),
            folder(4, None),
            folder(5, Some(3)),
        ]
    }

    #[test]
    fn forest_groups_children_under_parents_in_input_order() {
        let forest = build_forest(sample());
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].folder.id, Uuid::from_u128(1));
        assert_eq!(forest[1].folder.id, Uuid::from_u128(4));
        let ids: Vec<Uuid> = forest[0].children.iter().map(|c| c.folder.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(2), Uuid::from_u128(3)]);
        assert_eq!(forest[0].children[1].children[0].folder.id, Uuid::from_u128(5));
    }

    #[test]
    fn unresolvable_parent_becomes_a_root() {
        let mut folders = sample();
        folders.push(folder(6, Some(42))); // parent 42 does not exist
        let forest = build_forest(folders);
        assert!(forest.iter().any(|n| n.folder.id == Uuid::from_u128(6)));
    }

    #[test]
    fn descendants_cover_the_whole_subtree() {
        let folders = sample();
        let d = descendant_ids(&folders, Uuid::from_u128(1));
        assert_eq!(
            d,
            HashSet::from([Uuid::from_u128(2), Uuid::from_u128(3), Uuid::from_u128(5)])
        );
        assert!(descendant_ids(&folders, Uuid::from_u128(4)).is_empty());
    }

    #[test]
    fn move_rejects_self_and_descendants() {
        let folders = sample();
        let id = Uuid::from_u128(1);
        assert_eq!(
            validate_move(&folders, id, Some(id)),
            Err(MoveError::SelfParent)
        );
        assert_eq!(
            validate_move(&folders, id, Some(Uuid::from_u128(5))),
            Err(MoveError::CircularReference)
        );
        assert_eq!(validate_move(&folders, id, Some(Uuid::from_u128(4))), Ok(()));
        assert_eq!(validate_move(&folders, id, None), Ok(()));
    }

    #[test]
    fn move_parent_into_child_is_circular() {
        // F1 root, F2 under F1; moving F1 under F2 must fail.
        let folders = vec![folder(1, None), folder(2, Some(1))];
        assert_eq!(
            validate_move(&folders, Uuid::from_u128(1), Some(Uuid::from_u128(2))),
            Err(MoveError::CircularReference)
        );
    }

    #[test]
    fn path_walks_to_root() {
        let folders = sample();
        let path = resolve_path(&folders, Uuid::from_u128(5)).expect("path resolves");
        let ids: Vec<Uuid> = path.iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![Uuid::from_u128(1), Uuid::from_u128(3), Uuid::from_u128(5)]
        );
    }

    #[test]
    fn path_fails_on_broken_chain() {
        let folders = vec![folder(2, Some(42))];
        assert!(resolve_path(&folders, Uuid::from_u128(2)).is_none());
    }

    #[test]
    fn path_terminates_on_cyclic_data() {
        // A cycle cannot be created through `validate_move`, but the walk
        // must still terminate if the table is corrupt.
        let folders = vec![folder(1, Some(2)), folder(2, Some(1))];
        assert!(resolve_path(&folders, Uuid::from_u128(1)).is_none());
    }

    #[test]
    fn name_validation_trims_and_bounds() {
        assert_eq!(validate_name("  Reports  ").unwrap(), "Reports");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
        assert!(validate_name(&"x".repeat(100)).is_ok());
    }
}
