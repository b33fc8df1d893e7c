//! OutboundBuffer - ワーカー側のステータス報告バッファ
//!
//! 同じ id（= 同じ実行）の報告は 1 グループにまとめ、追加のたびに
//! `Envelope::shrink` で圧縮します。重みの合計が上限に達したら
//! 呼び出し側が `drain` して dispatch します。

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::Envelope;

struct BufferState<E> {
    /// グループの初出順
    order: Vec<String>,
    groups: HashMap<String, Vec<E>>,
    weight: u32,
}

impl<E> Default for BufferState<E> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            groups: HashMap::new(),
            weight: 0,
        }
    }
}

pub struct OutboundBuffer<E: Envelope> {
    max_weight: u32,
    state: Mutex<BufferState<E>>,
}

impl<E: Envelope> OutboundBuffer<E> {
    pub fn new(max_weight: u32) -> Self {
        Self {
            max_weight,
            state: Mutex::new(BufferState::default()),
        }
    }

    /// Append `entries`, compacting each touched group. Returns `true` when the
    /// buffer reached its weight limit.
    pub async fn put(&self, entries: Vec<E>) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        for entry in entries {
            let id = entry.id().to_string();
            if !state.groups.contains_key(&id) {
                state.order.push(id.clone());
            }
            let group = state.groups.entry(id).or_default();
            let before: u32 = group.iter().map(E::weight).sum();
            group.push(entry);
            let shrunk = E::shrink(group.as_slice());
            let after: u32 = shrunk.iter().map(E::weight).sum();
            *group = shrunk;
            state.weight = state.weight - before + after;
        }
        state.weight >= self.max_weight
    }

    /// Take every buffered entry, groups in first-seen order.
    pub async fn drain(&self) -> Vec<E> {
        let mut state = self.state.lock().await;
        let BufferState { order, mut groups, .. } = std::mem::take(&mut *state);
        order
            .into_iter()
            .filter_map(|id| groups.remove(&id))
            .flatten()
            .collect()
    }

    pub async fn weight(&self) -> u32 {
        self.state.lock().await.weight
    }

    pub async fn is_full(&self) -> bool {
        self.weight().await >= self.max_weight
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.groups.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
