use std::sync::{Mutex, MutexGuard, PoisonError};

use bridge_api::Record;

// ═══════════════════════════════════════════════════════════════
//  SharedBuffer
// ═══════════════════════════════════════════════════════════════

/// Неограниченная очередь записей между listener'ом и scheduler'ом.
///
/// `append` и `drain` взаимно исключают друг друга под одним mutex'ом;
/// `drain` подменяет вектор пустым, так что каждая запись попадает
/// ровно в один батч.
#[derive(Debug, Default)]
pub struct SharedBuffer {
    records: Mutex<Vec<Record>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить запись в конец очереди.
    pub fn append(&self, record: Record) {
        self.lock().push(record);
    }

    /// Атомарно забрать всё содержимое, оставив буфер пустым.
    pub fn drain(&self) -> Batch {
        let records = std::mem::take(&mut *self.lock());
        Batch { records }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Critical sections are a single push or swap, a panic inside one
    // cannot leave the Vec half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Batch
// ═══════════════════════════════════════════════════════════════

/// Снимок буфера, взятый одним `drain`. Порядок = порядок `append`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl From<Vec<Record>> for Batch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl IntoIterator for Batch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
