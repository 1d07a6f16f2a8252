use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use generic_array::ArrayLength;
use generic_array::GenericArray;

use crate::codec::ValueCodec;
use crate::error::Error;
use crate::error::Result;
use crate::node::NODE_HEADER_SIZE;
use crate::node::ROOT_METADATA_SIZE;
use crate::packed::PackedAllocatorRef;
use crate::packed::PackedTreeSpec;
use crate::packed::Value;
use crate::packed::MAX_CHANNELS;
use crate::tree::BranchNodeEntry;

pub const MIN_BLOCK_SIZE: usize = 64;
pub const MAX_STREAMS: usize = 16;
pub const DEFAULT_BRANCHING_FACTOR: usize = 256;
pub const DEFAULT_MERGE_THRESHOLD: u8 = 25;

/// How a column's values combine into summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Sum,
    Max,
}

impl AggregateKind {
    pub fn combine(self, acc: u64, value: u64) -> u64 {
        match self {
            AggregateKind::Sum => acc.wrapping_add(value),
            AggregateKind::Max => acc.max(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Tuples of `channels` integers with summed or max-aggregated columns.
    IndexedTree,
    /// Symbols of a small alphabet with per-symbol counts for rank/select.
    SymbolSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueWidth {
    /// Every value takes this many bits.
    Fixed(u8),
    /// Values are written with a self-delimiting codec.
    Variable(ValueCodec),
}

/// Describes one stream of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamDescriptor {
    pub kind: StreamKind,
    pub width: ValueWidth,
    /// Tuple arity for indexed streams; alphabet size for symbol streams.
    pub channels: usize,
    pub aggregate: AggregateKind,
}

impl StreamDescriptor {
    pub fn indexed(channels: usize, width: ValueWidth, aggregate: AggregateKind) -> Self {
        StreamDescriptor {
            kind: StreamKind::IndexedTree,
            width,
            channels,
            aggregate,
        }
    }

    /// A symbol stream over an alphabet of `1 << bits` symbols.
    pub fn symbols(bits: u8) -> Self {
        StreamDescriptor {
            kind: StreamKind::SymbolSequence,
            width: ValueWidth::Fixed(bits),
            channels: 1usize.checked_shl(u32::from(bits)).unwrap_or(usize::MAX),
            aggregate: AggregateKind::Sum,
        }
    }

    pub fn codec(&self) -> ValueCodec {
        match self.width {
            ValueWidth::Fixed(bits) => ValueCodec::Fixed(bits),
            ValueWidth::Variable(codec) => codec,
        }
    }

    pub(crate) fn symbol_bits(&self) -> u8 {
        match self.width {
            ValueWidth::Fixed(bits) => bits,
            ValueWidth::Variable(_) => 0,
        }
    }

    fn validate(&self, index: usize) -> Result<(), String> {
        match (self.kind, self.width) {
            (StreamKind::IndexedTree, _) if self.channels == 0 || self.channels > MAX_CHANNELS => Err(format!(
                "stream {index}: indexed streams need 1..={MAX_CHANNELS} channels, got {}",
                self.channels
            )),
            (StreamKind::IndexedTree, ValueWidth::Fixed(bits)) if bits == 0 || bits > 64 => {
                Err(format!("stream {index}: fixed width must be 1..=64 bits, got {bits}"))
            }
            (StreamKind::IndexedTree, ValueWidth::Variable(ValueCodec::Fixed(_))) => {
                Err(format!("stream {index}: variable width needs a self-delimiting codec"))
            }
            (StreamKind::IndexedTree, _) => Ok(()),
            (StreamKind::SymbolSequence, ValueWidth::Fixed(bits)) if (1..=8).contains(&bits) => {
                if self.channels != 1 << bits {
                    Err(format!("stream {index}: a {bits}-bit alphabet has {} symbols", 1 << bits))
                } else if self.aggregate != AggregateKind::Sum {
                    Err(format!("stream {index}: symbol counts are summed"))
                } else {
                    Ok(())
                }
            }
            (StreamKind::SymbolSequence, _) => Err(format!("stream {index}: symbols must be 1..=8 bits wide")),
        }
    }
}

/// User-facing tree configuration.
///
/// # Examples
///
/// ```
/// use packed_btree::{AggregateKind, StreamDescriptor, TreeConfig, ValueCodec, ValueWidth};
/// use typenum::U8;
///
/// let config = TreeConfig::new(4096)
///     .with_stream(StreamDescriptor::indexed(2, ValueWidth::Variable(ValueCodec::Varint), AggregateKind::Sum))
///     .with_stream(StreamDescriptor::symbols(2));
/// assert!(config.validate::<U8>().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    pub block_size: usize,
    /// Upper bound on children per branch, on top of the byte budget.
    pub branching_factor: usize,
    /// A non-root node below this percentage of its block is merged.
    pub merge_threshold: u8,
    pub streams: Vec<StreamDescriptor>,
}

impl TreeConfig {
    pub fn new(block_size: usize) -> Self {
        TreeConfig {
            block_size,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            streams: Vec::new(),
        }
    }

    pub fn with_stream(mut self, stream: StreamDescriptor) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    pub fn with_merge_threshold(mut self, percent: u8) -> Self {
        self.merge_threshold = percent;
        self
    }

    /// Checks the configuration against summary width `N` and derives the layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any stream is malformed, the summary columns
    /// exceed `N`, or a root branch with two children would not fit a block.
    pub fn validate<N: ArrayLength>(&self) -> Result<TreeLayout> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > u32::MAX as usize {
            return Err(Error::Config(format!(
                "block size {} outside {MIN_BLOCK_SIZE}..={}",
                self.block_size,
                u32::MAX
            )));
        }
        if self.streams.is_empty() || self.streams.len() > MAX_STREAMS {
            return Err(Error::Config(format!("a tree needs 1..={MAX_STREAMS} streams")));
        }
        if self.branching_factor < 3 {
            return Err(Error::Config(format!(
                "branching factor {} is below 3",
                self.branching_factor
            )));
        }
        if self.merge_threshold > 50 {
            return Err(Error::Config(format!(
                "merge threshold {}% above 50%",
                self.merge_threshold
            )));
        }
        for (index, stream) in self.streams.iter().enumerate() {
            stream.validate(index).map_err(Error::Config)?;
        }

        let mut offsets = Vec::with_capacity(self.streams.len());
        let mut kinds = Vec::new();
        for stream in &self.streams {
            offsets.push(kinds.len());
            kinds.push(AggregateKind::Sum);
            kinds.extend(core::iter::repeat(stream.aggregate).take(stream.channels));
        }
        if kinds.len() > N::USIZE {
            return Err(Error::Config(format!(
                "streams need {} summary columns but entries hold {}",
                kinds.len(),
                N::USIZE
            )));
        }

        let layout = TreeLayout {
            block_size: self.block_size,
            branching_factor: self.branching_factor,
            merge_threshold: self.merge_threshold,
            fingerprint: fingerprint(self),
            streams: self.streams.clone(),
            offsets,
            kinds,
        };
        let needed = layout.root_branch_bytes(2);
        if needed > self.block_size {
            return Err(Error::Config(format!(
                "block size {} cannot hold a root with two children ({needed} bytes)",
                self.block_size
            )));
        }
        Ok(layout)
    }
}

/// FNV-1a over the parts of the configuration that shape stored data.
fn fingerprint(config: &TreeConfig) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    let mut feed = |value: u64| {
        for byte in value.to_le_bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    };
    feed(config.block_size as u64);
    for stream in &config.streams {
        feed(stream.kind as u64);
        feed(stream.channels as u64);
        feed(stream.aggregate as u64);
        match stream.codec() {
            ValueCodec::Fixed(bits) => feed(u64::from(bits)),
            ValueCodec::Varint => feed(100),
            ValueCodec::EliasGamma => feed(101),
        }
    }
    hash
}

/// The validated, derived shape of a tree.
///
/// Summary entries concatenate, per stream, a size column followed by one
/// column per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    block_size: usize,
    branching_factor: usize,
    merge_threshold: u8,
    fingerprint: u64,
    streams: Vec<StreamDescriptor>,
    offsets: Vec<usize>,
    kinds: Vec<AggregateKind>,
}

impl TreeLayout {
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    pub fn stream(&self, stream: usize) -> &StreamDescriptor {
        &self.streams[stream]
    }

    pub fn width(&self) -> usize {
        self.kinds.len()
    }

    pub fn size_column(&self, stream: usize) -> usize {
        self.offsets[stream]
    }

    pub fn channel_column(&self, stream: usize, channel: usize) -> usize {
        self.offsets[stream] + 1 + channel
    }

    pub fn kind(&self, column: usize) -> AggregateKind {
        self.kinds[column]
    }

    /// Maps a summary column to its stream and the column within that stream's branch rows.
    pub(crate) fn locate_column(&self, column: usize) -> (usize, usize) {
        let stream = self.offsets.partition_point(|offset| *offset <= column) - 1;
        (stream, column - self.offsets[stream])
    }

    pub(crate) fn row(&self, stream: usize) -> core::ops::Range<usize> {
        let start = self.offsets[stream];
        start..start + 1 + self.streams[stream].channels
    }

    pub(crate) fn region_count(&self) -> usize {
        self.streams.len() + 2
    }

    pub(crate) fn children_region(&self) -> usize {
        self.streams.len()
    }

    pub(crate) fn meta_region(&self) -> usize {
        self.streams.len() + 1
    }

    pub(crate) fn leaf_spec(&self, stream: usize) -> PackedTreeSpec {
        let descriptor = self.stream(stream);
        PackedTreeSpec {
            columns: descriptor.channels,
            codec: descriptor.codec(),
            aggregate: descriptor.aggregate,
            leading_size: false,
        }
    }

    pub(crate) fn branch_spec(&self, stream: usize) -> PackedTreeSpec {
        let descriptor = self.stream(stream);
        PackedTreeSpec {
            columns: 1 + descriptor.channels,
            codec: ValueCodec::Fixed(64),
            aggregate: descriptor.aggregate,
            leading_size: true,
        }
    }

    pub(crate) fn children_spec(&self) -> PackedTreeSpec {
        PackedTreeSpec {
            columns: 1,
            codec: ValueCodec::Fixed(64),
            aggregate: AggregateKind::Max,
            leading_size: false,
        }
    }

    /// Whether a node using `used` of its block bytes should be merged.
    ///
    /// Only payload counts: the header and region table of an empty node are
    /// taken off both sides.
    pub(crate) fn is_underfull(&self, used: usize) -> bool {
        let base = NODE_HEADER_SIZE + PackedAllocatorRef::overhead(self.region_count());
        used.saturating_sub(base) * 100 < self.block_size.saturating_sub(base) * usize::from(self.merge_threshold)
    }

    fn root_branch_bytes(&self, children: usize) -> usize {
        let align = |bytes: usize| bytes.div_ceil(8) * 8;
        let mut bytes = NODE_HEADER_SIZE + PackedAllocatorRef::overhead(self.region_count());
        for stream in 0..self.streams.len() {
            let spec = self.branch_spec(stream);
            bytes += align(spec.required_bytes(children, children * spec.columns * 64));
        }
        let children_spec = self.children_spec();
        bytes += align(children_spec.required_bytes(children, children * 64));
        bytes + align(ROOT_METADATA_SIZE)
    }

    /// Checks that `value` has the right shape for `stream` and fits its codec.
    pub fn check_value(&self, stream: usize, value: &Value) -> Result<()> {
        let descriptor = self
            .streams
            .get(stream)
            .ok_or_else(|| Error::Config(format!("no stream {stream}")))?;
        match (descriptor.kind, value) {
            (StreamKind::IndexedTree, Value::Tuple(tuple)) if tuple.len() == descriptor.channels => {
                let codec = descriptor.codec();
                tuple.iter().try_for_each(|v| codec.check(*v))
            }
            (StreamKind::IndexedTree, _) => Err(Error::StreamKind {
                stream,
                expected: "a tuple with one value per channel",
            }),
            (StreamKind::SymbolSequence, Value::Symbol(symbol)) if usize::from(*symbol) < descriptor.channels => Ok(()),
            (StreamKind::SymbolSequence, Value::Symbol(symbol)) => Err(Error::ValueOutOfRange {
                value: u64::from(*symbol),
                bits: descriptor.symbol_bits(),
            }),
            (StreamKind::SymbolSequence, Value::Tuple(_)) => Err(Error::StreamKind {
                stream,
                expected: "a symbol",
            }),
        }
    }

    /// The summary contribution of one element.
    pub fn entry_of<N: ArrayLength>(&self, stream: usize, value: &Value) -> Result<BranchNodeEntry<N>> {
        self.check_value(stream, value)?;
        let mut entry = Self::zero::<N>();
        entry[self.size_column(stream)] = 1;
        match value {
            Value::Tuple(tuple) => {
                for (channel, v) in tuple.iter().enumerate() {
                    entry[self.channel_column(stream, channel)] = *v;
                }
            }
            Value::Symbol(symbol) => entry[self.channel_column(stream, usize::from(*symbol))] = 1,
        }
        Ok(entry)
    }

    pub fn zero<N: ArrayLength>() -> BranchNodeEntry<N> {
        GenericArray::default()
    }

    /// Folds `entry` into `acc` column by column.
    pub fn combine<N: ArrayLength>(&self, acc: &mut BranchNodeEntry<N>, entry: &BranchNodeEntry<N>) {
        for (column, kind) in self.kinds.iter().enumerate() {
            acc[column] = kind.combine(acc[column], entry[column]);
        }
    }

    /// Applies an element delta to a parent's entry for a child.
    ///
    /// Summed columns add `add` and subtract `sub`; max columns cannot be
    /// maintained incrementally and are taken from the child's fresh summary.
    pub fn apply_delta<N: ArrayLength>(
        &self,
        entry: &mut BranchNodeEntry<N>,
        add: &BranchNodeEntry<N>,
        sub: &BranchNodeEntry<N>,
        child: &BranchNodeEntry<N>,
    ) {
        for (column, kind) in self.kinds.iter().enumerate() {
            entry[column] = match kind {
                AggregateKind::Sum => entry[column].wrapping_add(add[column]).wrapping_sub(sub[column]),
                AggregateKind::Max => child[column],
            };
        }
    }

    pub(crate) fn has_max_columns(&self) -> bool {
        self.kinds.contains(&AggregateKind::Max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use typenum::{U2, U8};

    use crate::packed::Tuple;

    fn map_config(block_size: usize) -> TreeConfig {
        TreeConfig::new(block_size).with_stream(StreamDescriptor::indexed(
            2,
            ValueWidth::Variable(ValueCodec::Varint),
            AggregateKind::Max,
        ))
    }

    #[test]
    fn test_layout_columns() -> Result<()> {
        let layout = map_config(1024)
            .with_stream(StreamDescriptor::symbols(1))
            .validate::<U8>()?;
        assert_eq!(layout.width(), 6);
        assert_eq!(layout.size_column(1), 3);
        assert_eq!(layout.channel_column(1, 1), 5);
        assert_eq!(layout.kind(0), AggregateKind::Sum);
        assert_eq!(layout.kind(2), AggregateKind::Max);
        assert_eq!(layout.kind(4), AggregateKind::Sum);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_configs() {
        assert!(matches!(map_config(1024).validate::<U2>(), Err(Error::Config(_))));
        assert!(matches!(map_config(16).validate::<U8>(), Err(Error::Config(_))));
        assert!(matches!(map_config(96).validate::<U8>(), Err(Error::Config(_))));
        assert!(matches!(TreeConfig::new(1024).validate::<U8>(), Err(Error::Config(_))));
        assert!(matches!(
            map_config(1024).with_branching_factor(2).validate::<U8>(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TreeConfig::new(1024)
                .with_stream(StreamDescriptor::indexed(1, ValueWidth::Fixed(0), AggregateKind::Sum))
                .validate::<U8>(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            TreeConfig::new(4096).with_stream(StreamDescriptor::symbols(9)).validate::<U8>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_shape() -> Result<()> {
        let a = map_config(1024).validate::<U8>()?;
        let b = map_config(2048).validate::<U8>()?;
        let c = map_config(1024).validate::<U8>()?;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        Ok(())
    }

    #[test]
    fn test_entry_of_and_delta() -> Result<()> {
        let layout = map_config(1024)
            .with_stream(StreamDescriptor::symbols(2))
            .validate::<U8>()?;
        let tuple = layout.entry_of::<U8>(0, &Value::Tuple(Tuple::new(&[7, 70])))?;
        assert_eq!(&tuple[..3], &[1, 7, 70]);
        let symbol = layout.entry_of::<U8>(1, &Value::Symbol(2))?;
        assert_eq!(&symbol[3..8], &[1, 0, 0, 1, 0]);

        assert!(matches!(
            layout.entry_of::<U8>(1, &Value::Symbol(4)),
            Err(Error::ValueOutOfRange { value: 4, bits: 2 })
        ));
        assert!(matches!(
            layout.entry_of::<U8>(0, &Value::Symbol(0)),
            Err(Error::StreamKind { stream: 0, .. })
        ));

        let mut parent = tuple.clone();
        let child = layout.entry_of::<U8>(0, &Value::Tuple(Tuple::new(&[9, 1])))?;
        layout.apply_delta(&mut parent, &symbol, &TreeLayout::zero::<U8>(), &child);
        assert_eq!(&parent[..8], &[1, 9, 1, 1, 0, 0, 1, 0]);
        Ok(())
    }
}
