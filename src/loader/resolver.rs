//! Debug-type resolution into the program type system.
//!
//! Second pass over [`DebugInfo::types`]: every DIE-offset-keyed debug type gets a
//! surface name and size by chasing its `type_ref` chain (pointers, qualifiers,
//! typedefs, arrays), then is promoted into a flat program
//! [`Type`](crate::program::Type).
//!
//! The DIE reference graph is cyclic in real programs (a struct holding a pointer to
//! itself is the canonical case). A set of currently-resolving DIE offsets breaks the
//! recursion: re-entering a type returns its partially-known name and size instead of
//! descending again.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::program::{DebugInfo, DebugType, DebugTypeKind, Type, TypeKind};

struct Resolver<'a> {
    by_offset: FxHashMap<u64, &'a DebugType>,
    resolving: FxHashSet<u64>,
}

impl<'a> Resolver<'a> {
    fn resolve_ref(&mut self, type_ref: u64) -> (String, u32) {
        match self.by_offset.get(&type_ref).copied() {
            Some(target) => self.resolve_type(target),
            None => (String::new(), 0),
        }
    }

    /// Compute the surface name and size of one debug type. Follows `type_ref`
    /// recursively; a cycle yields the partial name/size known at re-entry.
    fn resolve_type(&mut self, dt: &'a DebugType) -> (String, u32) {
        if dt.die_offset != 0 {
            if self.resolving.contains(&dt.die_offset) {
                return (dt.name.clone(), dt.size);
            }
            self.resolving.insert(dt.die_offset);
        }

        let mut name = dt.name.clone();
        let mut size = dt.size;

        match dt.kind {
            DebugTypeKind::Pointer => {
                let (target_name, _) = self.resolve_ref(dt.type_ref);
                let base = if target_name.is_empty() {
                    "void"
                } else {
                    &target_name
                };
                name = format!("{base}*");
                if size == 0 {
                    size = 8;
                }
            }
            DebugTypeKind::Const => {
                let (target_name, target_size) = self.resolve_ref(dt.type_ref);
                if !target_name.is_empty() {
                    name = format!("const {target_name}");
                }
                if size == 0 {
                    size = target_size;
                }
            }
            DebugTypeKind::Volatile => {
                let (target_name, target_size) = self.resolve_ref(dt.type_ref);
                if !target_name.is_empty() {
                    name = format!("volatile {target_name}");
                }
                if size == 0 {
                    size = target_size;
                }
            }
            DebugTypeKind::Typedef => {
                let (target_name, target_size) = self.resolve_ref(dt.type_ref);
                if name.is_empty() && !target_name.is_empty() {
                    name = target_name;
                }
                if size == 0 {
                    size = target_size;
                }
            }
            DebugTypeKind::Array => {
                let (target_name, target_size) = self.resolve_ref(dt.type_ref);
                let base = if target_name.is_empty() {
                    "void"
                } else {
                    &target_name
                };
                name = if dt.array_count != 0 {
                    format!("{base}[{}]", dt.array_count)
                } else {
                    format!("{base}[]")
                };
                if size == 0 && target_size != 0 && dt.array_count != 0 {
                    size = (u64::from(target_size) * dt.array_count) as u32;
                }
            }
            DebugTypeKind::Struct | DebugTypeKind::Union => {
                if name.is_empty() && dt.die_offset != 0 {
                    let prefix = if dt.kind == DebugTypeKind::Union {
                        "union"
                    } else {
                        "struct"
                    };
                    name = format!("{prefix}_{}", dt.die_offset);
                }
            }
            DebugTypeKind::Enumeration => {
                if name.is_empty() && dt.die_offset != 0 {
                    name = format!("enum_{}", dt.die_offset);
                }
            }
            DebugTypeKind::Subroutine => {
                if name.is_empty() {
                    name = "fn".to_string();
                }
                if size == 0 {
                    size = 8;
                }
            }
            DebugTypeKind::Base | DebugTypeKind::Unknown => {}
        }

        if dt.die_offset != 0 {
            self.resolving.remove(&dt.die_offset);
        }

        (name, size)
    }
}

fn promote_kind(kind: DebugTypeKind) -> TypeKind {
    match kind {
        DebugTypeKind::Base
        | DebugTypeKind::Typedef
        | DebugTypeKind::Const
        | DebugTypeKind::Volatile
        | DebugTypeKind::Enumeration => TypeKind::Integer,
        DebugTypeKind::Pointer | DebugTypeKind::Subroutine => TypeKind::Pointer,
        DebugTypeKind::Struct | DebugTypeKind::Union => TypeKind::Struct,
        DebugTypeKind::Array => TypeKind::Array,
        DebugTypeKind::Unknown => TypeKind::Void,
    }
}

/// Promote every resolvable debug type into a program [`Type`].
///
/// Each DIE offset is emitted at most once, in [`DebugInfo::types`] order; types that
/// resolve to an empty name are dropped.
pub(crate) fn resolve(debug: &DebugInfo) -> Vec<Type> {
    let mut resolver = Resolver {
        by_offset: debug
            .types
            .iter()
            .filter(|dt| dt.die_offset != 0)
            .map(|dt| (dt.die_offset, dt))
            .collect(),
        resolving: FxHashSet::default(),
    };

    let mut emitted = FxHashSet::default();
    let mut promoted = Vec::new();

    for dt in &debug.types {
        if dt.die_offset == 0 || emitted.contains(&dt.die_offset) {
            continue;
        }

        let (name, size) = resolver.resolve_type(dt);
        if name.is_empty() {
            continue;
        }

        promoted.push(Type {
            name,
            kind: promote_kind(dt.kind),
            size,
        });
        emitted.insert(dt.die_offset);
    }

    promoted
}
