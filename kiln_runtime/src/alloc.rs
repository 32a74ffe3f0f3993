// objects are freed by refcount; this only tracks how many came and went, per thread
use std::cell::RefCell;

use kiln_types::id::ClassId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::class::{self, ClassVocabulary};
use crate::error::{fail, Result, RtError};
use crate::exec;
use crate::object::ObjectRef;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocStats {
    pub allocated: u64,
    pub deleted: u64,
}

impl AllocStats {
    pub fn live(&self) -> u64 {
        self.allocated - self.deleted
    }
}

#[derive(Debug, Default)]
struct Alloc {
    total: AllocStats,
    per_class: FxHashMap<ClassId, AllocStats>,
}

thread_local! {
    static ALLOC: RefCell<Alloc> = RefCell::new(Alloc::default());
}

pub(crate) fn note_alloc(class: &ClassVocabulary) {
    ALLOC.with(|a| {
        let mut a = a.borrow_mut();
        a.total.allocated += 1;
        a.per_class.entry(class.id()).or_default().allocated += 1;
    });
}

pub(crate) fn note_delete(class: &ClassVocabulary) {
    ALLOC.with(|a| {
        let mut a = a.borrow_mut();
        a.total.deleted += 1;
        a.per_class.entry(class.id()).or_default().deleted += 1;
    });
}

pub fn stats() -> AllocStats {
    ALLOC.with(|a| a.borrow().total)
}

pub fn class_stats(class: &ClassVocabulary) -> AllocStats {
    ALLOC.with(|a| a.borrow().per_class.get(&class.id()).copied().unwrap_or_default())
}

/// Builds a zeroed instance of `class` with its native constructor. No `init` opcode is run.
pub fn allocate(class: &'static ClassVocabulary) -> Result<ObjectRef> {
    let construct = match class.constructor() {
        Some(construct) => construct,
        None => {
            return fail(RtError::illegal(format!(
                "cannot explicitly create {}",
                class.name()
            )))
        }
    };
    log::debug!("allocating {}", class.name());
    Ok(ObjectRef::wrap(construct(class)))
}

/// Full creation path: the class's `new` override if one is set, otherwise `allocate`
/// followed by the class's `init` opcode.
pub fn create(class: &'static ClassVocabulary) -> Result<ObjectRef> {
    if let Some(obj) = class::run_new_override(class)? {
        return Ok(obj);
    }
    let obj = allocate(class)?;
    if let Some(op) = class.init_op() {
        obj.keep();
        let res = exec::execute_opcode(op, &[obj.clone()]);
        obj.disown();
        res?;
    }
    Ok(obj)
}
