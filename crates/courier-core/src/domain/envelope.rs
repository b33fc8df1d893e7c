//! Envelope - 配送単位の共通インターフェース
//!
//! outbound buffer やパーティショナは具体的なメッセージ型を知らずに
//! `Envelope` だけを使って grouping / 重み計算 / 圧縮を行います。

/// Transport-envelope capability implemented by queued message kinds.
pub trait Envelope: Clone + Send + Sync + 'static {
    /// Grouping key: entries with the same id describe the same logical work item.
    fn id(&self) -> &str;

    /// Load-balancing weight.
    fn weight(&self) -> u32;

    /// Compacts entries that share one `id`, oldest first.
    ///
    /// Must not mutate the input; returns a new sequence that keeps the
    /// original relative order of the retained entries.
    fn shrink(entries: &[Self]) -> Vec<Self>;
}
