//! Dependency-tracked WGSL composition.
//!
//! Programs are built from `'static` fragments. A [`Definition`] is a piece of
//! shared WGSL (a struct, a helper function, a constant); a [`Binding`] is a
//! resource the program reads or writes. Each fragment lists the fragments it
//! references, so [`compose`] can walk the graph, emit every definition once in
//! dependency order and assign binding slots to the union of all bindings the
//! program reaches. At dispatch time a [`BindingContext`] must supply a
//! resource for every one of those bindings.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// How a storage binding is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `var<storage, read>`.
    Read,
    /// `var<storage, read_write>`.
    ReadWrite,
}

/// Address space and type of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `var<uniform>` of the given type.
    Uniform {
        /// WGSL type.
        ty: &'static str,
    },
    /// `var<storage, ...>` of the given type.
    Storage {
        /// WGSL type.
        ty: &'static str,
        /// Read-only or read-write.
        access: Access,
    },
}

impl BindingKind {
    /// WGSL type of the bound variable.
    pub fn ty(&self) -> &'static str {
        match *self {
            BindingKind::Uniform { ty } | BindingKind::Storage { ty, .. } => ty,
        }
    }

    /// `true` for storage bindings.
    pub fn is_storage(&self) -> bool {
        matches!(self, BindingKind::Storage { .. })
    }

    fn address_space(&self) -> &'static str {
        match self {
            BindingKind::Uniform { .. } => "uniform",
            BindingKind::Storage {
                access: Access::Read,
                ..
            } => "storage, read",
            BindingKind::Storage {
                access: Access::ReadWrite,
                ..
            } => "storage, read_write",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Uniform { ty } => write!(f, "uniform {ty}"),
            BindingKind::Storage {
                ty,
                access: Access::Read,
            } => write!(f, "read-only storage {ty}"),
            BindingKind::Storage {
                ty,
                access: Access::ReadWrite,
            } => write!(f, "read-write storage {ty}"),
        }
    }
}

/// A resource referenced by WGSL code.
#[derive(Debug)]
pub struct Binding {
    /// Variable name, also the key a [`BindingContext`] is filled under.
    pub name: &'static str,
    /// Address space and type.
    pub kind: BindingKind,
    /// Fragments the declaration needs, typically the struct behind `ty`.
    pub deps: &'static [Dependency],
}

/// A named piece of shared WGSL.
#[derive(Debug)]
pub struct Definition {
    /// Name, unique within a composed program.
    pub name: &'static str,
    /// WGSL source.
    pub source: &'static str,
    /// Fragments this source references.
    pub deps: &'static [Dependency],
}

/// Edge of the fragment graph.
#[derive(Debug, Clone, Copy)]
pub enum Dependency {
    /// Needs a resource.
    Binding(&'static Binding),
    /// Needs shared source.
    Definition(&'static Definition),
}

impl Dependency {
    fn name(&self) -> &'static str {
        match self {
            Dependency::Binding(b) => b.name,
            Dependency::Definition(d) => d.name,
        }
    }

    fn address(&self) -> usize {
        match self {
            Dependency::Binding(b) => *b as *const Binding as usize,
            Dependency::Definition(d) => *d as *const Definition as usize,
        }
    }

    fn deps(&self) -> &'static [Dependency] {
        match self {
            Dependency::Binding(b) => b.deps,
            Dependency::Definition(d) => d.deps,
        }
    }
}

/// A compute program before composition.
#[derive(Debug)]
pub struct ProgramSource {
    /// Label for pipelines and diagnostics.
    pub label: &'static str,
    /// WGSL holding the `main` entry point.
    pub source: &'static str,
    /// Fragments the entry source references directly.
    pub deps: &'static [Dependency],
}

/// A program with all dependencies resolved.
#[derive(Debug, Clone)]
pub struct ComposedProgram {
    /// Label copied from the [`ProgramSource`].
    pub label: &'static str,
    /// Complete WGSL module.
    pub source: String,
    /// Bindings in slot order; slot `i` is `@binding(i)` of group 0.
    pub bindings: Vec<&'static Binding>,
}

impl ComposedProgram {
    /// Number of storage bindings.
    pub fn storage_count(&self) -> u32 {
        self.bindings.iter().filter(|b| b.kind.is_storage()).count() as u32
    }
}

/// Composition and binding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShaderError {
    /// A binding the program needs was not supplied.
    #[error("binding context lacks {kind} `{name}` required by program `{program}`")]
    MissingBinding {
        /// Program label.
        program: &'static str,
        /// Binding name.
        name: &'static str,
        /// Declared kind, rendered.
        kind: String,
    },
    /// A binding was supplied under the right name with a different type.
    #[error("program `{program}` expects `{name}` as {expected}, context holds {found}")]
    KindMismatch {
        /// Program label.
        program: &'static str,
        /// Binding name.
        name: &'static str,
        /// Kind the program declares.
        expected: String,
        /// Kind the context was filled with.
        found: String,
    },
    /// More storage bindings than one shader stage may use.
    #[error("program `{program}` uses {count} storage bindings, device allows {limit}")]
    TooManyBindings {
        /// Program label.
        program: &'static str,
        /// Storage bindings used.
        count: u32,
        /// Device limit.
        limit: u32,
    },
    /// The fragment graph loops back on itself.
    #[error("dependency cycle through `{name}` in program `{program}`")]
    Cycle {
        /// Program label.
        program: &'static str,
        /// Fragment reached twice on one path.
        name: &'static str,
    },
    /// Two distinct fragments share a name.
    #[error("two fragments named `{name}` in program `{program}`")]
    NameConflict {
        /// Program label.
        program: &'static str,
        /// Duplicated name.
        name: &'static str,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Composer {
    program: &'static str,
    marks: HashMap<usize, Mark>,
    names: HashMap<&'static str, usize>,
    definitions: Vec<&'static Definition>,
    bindings: Vec<&'static Binding>,
}

impl Composer {
    fn visit(&mut self, dep: Dependency) -> Result<(), ShaderError> {
        let address = dep.address();
        match self.marks.get(&address) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(ShaderError::Cycle {
                    program: self.program,
                    name: dep.name(),
                })
            }
            None => {}
        }
        if let Some(&other) = self.names.get(dep.name()) {
            if other != address {
                return Err(ShaderError::NameConflict {
                    program: self.program,
                    name: dep.name(),
                });
            }
        }
        self.names.insert(dep.name(), address);
        self.marks.insert(address, Mark::Visiting);

        for &child in dep.deps() {
            self.visit(child)?;
        }

        self.marks.insert(address, Mark::Done);
        match dep {
            Dependency::Binding(b) => self.bindings.push(b),
            Dependency::Definition(d) => self.definitions.push(d),
        }
        Ok(())
    }
}

/// Resolve `program`'s fragment graph into one WGSL module.
pub fn compose(program: &ProgramSource) -> Result<ComposedProgram, ShaderError> {
    let mut composer = Composer {
        program: program.label,
        marks: HashMap::new(),
        names: HashMap::new(),
        definitions: Vec::new(),
        bindings: Vec::new(),
    };
    for &dep in program.deps {
        composer.visit(dep)?;
    }

    let mut source = String::new();
    for definition in &composer.definitions {
        source.push_str(definition.source.trim());
        source.push_str("\n\n");
    }
    for (slot, binding) in composer.bindings.iter().enumerate() {
        source.push_str(&format!(
            "@group(0) @binding({slot}) var<{}> {}: {};\n",
            binding.kind.address_space(),
            binding.name,
            binding.kind.ty()
        ));
    }
    source.push('\n');
    source.push_str(program.source.trim());
    source.push('\n');

    Ok(ComposedProgram {
        label: program.label,
        source,
        bindings: composer.bindings,
    })
}

/// Resources keyed by binding name.
///
/// A binding declared read-only and one declared read-write may share a name;
/// both resolve to the same resource.
pub struct BindingContext<'a, R> {
    entries: HashMap<&'static str, (&'static Binding, &'a R)>,
}

impl<R> Default for BindingContext<'_, R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<'a, R> BindingContext<'a, R> {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply `resource` for `binding`, replacing any earlier value under its name.
    pub fn set(&mut self, binding: &'static Binding, resource: &'a R) -> &mut Self {
        self.entries.insert(binding.name, (binding, resource));
        self
    }

    /// Resource for every binding of `program`, paired with its slot.
    pub fn resolve(
        &self,
        program: &ComposedProgram,
        max_storage: u32,
    ) -> Result<Vec<(u32, &'a R)>, ShaderError> {
        let count = program.storage_count();
        if count > max_storage {
            return Err(ShaderError::TooManyBindings {
                program: program.label,
                count,
                limit: max_storage,
            });
        }

        program
            .bindings
            .iter()
            .enumerate()
            .map(|(slot, wanted)| {
                let (held, resource) =
                    self.entries
                        .get(wanted.name)
                        .ok_or_else(|| ShaderError::MissingBinding {
                            program: program.label,
                            name: wanted.name,
                            kind: wanted.kind.to_string(),
                        })?;
                let same_kind = held.kind.ty() == wanted.kind.ty()
                    && held.kind.is_storage() == wanted.kind.is_storage();
                if !same_kind {
                    return Err(ShaderError::KindMismatch {
                        program: program.label,
                        name: wanted.name,
                        expected: wanted.kind.to_string(),
                        found: held.kind.to_string(),
                    });
                }
                Ok((slot as u32, *resource))
            })
            .collect()
    }
}
