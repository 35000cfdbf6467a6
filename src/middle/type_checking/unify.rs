//! Disjoint set over type variables. Each root may carry the type it has been
//! bound to. Every mutation is recorded in an undo log so that the work done
//! while checking a single body can be thrown away if the body fails to check.

use crate::{
    index::IndexVec,
    middle::ty::{Type, TypeVariableId},
};

#[derive(Debug, Default)]
pub struct UnificationTable {
    parents: IndexVec<TypeVariableId, TypeVariableId>,
    ranks: IndexVec<TypeVariableId, u32>,
    bindings: IndexVec<TypeVariableId, Option<Type>>,

    undo_log: Vec<UndoEntry>,
    open_snapshots: usize,
}

#[derive(Debug)]
enum UndoEntry {
    NewVariable,
    SetParent {
        variable: TypeVariableId,
        old: TypeVariableId,
    },
    SetRank {
        variable: TypeVariableId,
        old: u32,
    },
    Bind {
        variable: TypeVariableId,
        old: Option<Type>,
    },
}

/// A point in the undo log we may roll back to
#[derive(Debug)]
#[must_use = "snapshots must be either committed or rolled back"]
pub struct Snapshot {
    undo_len: usize,
}

impl UnificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn new_variable(&mut self) -> TypeVariableId {
        let id = self.parents.next_index();
        self.parents.push(id);
        self.ranks.push(0);
        self.bindings.push(None);

        self.log(UndoEntry::NewVariable);
        id
    }

    /// Finds the representative of the set containing `variable`, compressing
    /// the path on the way back up
    pub fn find(&mut self, variable: TypeVariableId) -> TypeVariableId {
        let parent = self.parents[variable];
        if parent == variable {
            return variable;
        }

        let root = self.find(parent);
        if root != parent {
            self.set_parent(variable, root);
        }
        root
    }

    /// Merges the sets of both variables by rank. The caller is responsible
    /// for reconciling the bindings of the two roots before calling this.
    pub fn union(&mut self, a: TypeVariableId, b: TypeVariableId) -> TypeVariableId {
        let a = self.find(a);
        let b = self.find(b);
        if a == b {
            return a;
        }

        let (root, child) = match self.ranks[a].cmp(&self.ranks[b]) {
            core::cmp::Ordering::Less => (b, a),
            core::cmp::Ordering::Greater => (a, b),
            core::cmp::Ordering::Equal => {
                let old = self.ranks[a];
                self.log(UndoEntry::SetRank { variable: a, old });
                self.ranks[a] += 1;
                (a, b)
            }
        };

        self.set_parent(child, root);

        // Keep whichever binding exists so the merged set stays bound
        if self.bindings[root].is_none() {
            if let Some(ty) = self.bindings[child].clone() {
                self.bind(root, ty);
            }
        }

        root
    }

    /// Returns the type the set of `variable` is bound to, if any
    pub fn probe(&mut self, variable: TypeVariableId) -> Option<Type> {
        let root = self.find(variable);
        self.bindings[root].clone()
    }

    /// Binds the set containing `variable` to a type. The occurs check must
    /// already have been done by the caller.
    pub fn bind(&mut self, variable: TypeVariableId, ty: Type) {
        let root = self.find(variable);
        let old = self.bindings[root].replace(ty);
        self.log(UndoEntry::Bind {
            variable: root,
            old,
        });
    }

    pub fn snapshot(&mut self) -> Snapshot {
        self.open_snapshots += 1;
        Snapshot {
            undo_len: self.undo_log.len(),
        }
    }

    /// Undoes every change made since the snapshot was taken
    pub fn rollback_to(&mut self, snapshot: Snapshot) {
        while self.undo_log.len() > snapshot.undo_len {
            let Some(entry) = self.undo_log.pop() else {
                break;
            };

            match entry {
                UndoEntry::NewVariable => {
                    self.parents.pop();
                    self.ranks.pop();
                    self.bindings.pop();
                }
                UndoEntry::SetParent { variable, old } => self.parents[variable] = old,
                UndoEntry::SetRank { variable, old } => self.ranks[variable] = old,
                UndoEntry::Bind { variable, old } => self.bindings[variable] = old,
            }
        }

        self.open_snapshots -= 1;
    }

    /// Keeps every change made since the snapshot was taken
    pub fn commit(&mut self, snapshot: Snapshot) {
        debug_assert!(self.undo_log.len() >= snapshot.undo_len);

        self.open_snapshots -= 1;
        if self.open_snapshots == 0 {
            self.undo_log.clear();
        }
    }

    fn set_parent(&mut self, variable: TypeVariableId, parent: TypeVariableId) {
        let old = core::mem::replace(&mut self.parents[variable], parent);
        self.log(UndoEntry::SetParent { variable, old });
    }

    fn log(&mut self, entry: UndoEntry) {
        if self.open_snapshots > 0 {
            self.undo_log.push(entry);
        }
    }
}
