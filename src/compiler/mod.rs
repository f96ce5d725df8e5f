//! Method rewriting.
//!
//! This module turns frozen analysis results into rewritten bytecode:
//!
//! - [`crate::analysis`] - rule inference over one class
//! - [`compiler`](self) - removal analysis, slot allocation, rewrite, shims
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Rewrite Pipeline                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ClassTransformer            One class, one shared lattice       │
//! │    ├─ analyze_all_methods()   (analysis + deferred bindings)     │
//! │    ├─ finalize()              (signatures, field retyping)       │
//! │    └─ transform_method()      (per method, below)                │
//! │                                                                  │
//! │  RewriteContext              Frozen view of one method           │
//! │    ├─ Slot tables             (original slot -> new slot)        │
//! │    ├─ Accepted call specs                                        │
//! │    └─ Scheduled edits         (before / after / deleted)         │
//! │                                                                  │
//! │  Emitter synthesis           Which operands leave the stack      │
//! │    ├─ Removal fixed point                                        │
//! │    └─ Generators              (replayed loads, literals, parked) │
//! │                                                                  │
//! │  VariableAllocator           Scratch slots by live range         │
//! │                                                                  │
//! │  Mutator                     Instruction rewrite                 │
//! │    ├─ Loads / stores / literals / comparisons                    │
//! │    ├─ Calls, templates, lambda call sites                        │
//! │    └─ Local variable debug table                                 │
//! │                                                                  │
//! │  Shims                       Original entry points               │
//! │    ├─ Dispatcher              (renamed methods)                  │
//! │    ├─ Converter               (safety mode, new descriptors)     │
//! │    ├─ Field casts + safety flag                                  │
//! │    └─ Magic-guarded constructor                                  │
//! │                                                                  │
//! │  Renaming                    Duplicated class mode               │
//! │                                                                  │
//! │  TransformSession            Run-scoped counters and warnings    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod allocator;
mod calls;
mod config;
mod context;
mod emitters;
mod mutator;
mod rename;
mod session;
mod shim;
mod transformer;

pub use allocator::VariableAllocator;
pub use config::{TransformerConfig, DEFAULT_SUFFIX, DUPLICATE_SUFFIX};
pub use context::MethodPlan;
pub(crate) use context::RewriteContext;
pub use emitters::Generator;
pub use session::TransformSession;
pub use shim::CONSTRUCTOR_MAGIC;
pub use transformer::ClassTransformer;
