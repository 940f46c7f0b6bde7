// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Book-keeping for material flowing between partitions during flow accumulation.
//!
//! An accumulation algorithm routes material through a flow-direction network. Within a
//! partition this is a local computation, but streams cross partition borders. For every
//! partition, an [`ArrayPartitionIO`] records
//!
//! - the *input cells*: border cells that still wait for material from upstream partitions,
//! - the *output cells*: border cells whose material is known and has to be pushed into a
//!   neighbouring partition, together with the direction of the receiving cell and the value.
//!
//! Input cells are known when the record is created and are only ever removed, once material
//! for them has arrived ([`remove_input_cell`](ArrayPartitionIO::remove_input_cell)). A
//! partition without input cells is *solved*. Output cells are added as the local computation
//! resolves them ([`add_output_cell`](ArrayPartitionIO::add_output_cell)) and removed when they
//! are forwarded ([`drain`](ArrayPartitionIO::drain)). A partition without output cells is
//! *drained*. Both states are independent: a stream can leave a partition and come back into
//! it, so partitions typically drain partly before they are solved.
//!
//! ```rust
//! # use tessera::ArrayPartitionIO;
//! // 3x3 partition still waiting for material entering at its north-west corner
//! let io = ArrayPartitionIO::new([3, 3], vec![[0, 0]]);
//! assert!(!io.is_solved());
//!
//! // material leaving through the east side
//! io.add_output_cell([1, 2], [0, 1], 4.5);
//! assert_eq!(io.partition_offsets().into_iter().collect::<Vec<_>>(), vec![[0, 1]]);
//!
//! // arrives in the first column of the eastern neighbour, which is 3x5 cells
//! assert_eq!(io.drain(&[0, 1], &[3, 5]), vec![([1, 0], 4.5)]);
//! assert!(io.is_drained());
//!
//! io.remove_input_cell(&[0, 0]);
//! assert!(io.is_solved());
//! ```
//!
//! All operations take `&self`. The three internal collections are guarded by their own mutex;
//! operations spanning several of them lock in the order input cells, offsets, values.
use crate::shape::{self, Indices, Offset, Shape};
use smallvec::SmallVec;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Mutex, MutexGuard},
};

/// Distinct neighbour directions along with the number of output cells draining towards each.
///
/// A two-dimensional partition has at most eight neighbours.
pub type PartitionOffsetCounts<const RANK: usize> = SmallVec<[(Offset<RANK>, usize); 8]>;

/// Input and output border cells of one partition in a flow-accumulation computation.
pub struct ArrayPartitionIO<V, const RANK: usize> {
    partition_shape: Shape<RANK>,
    input_cells: Mutex<Vec<Indices<RANK>>>,
    /// Offset from each output cell to the cell it drains into.
    offsets: Mutex<BTreeMap<Indices<RANK>, Offset<RANK>>>,
    values: Mutex<BTreeMap<Indices<RANK>, V>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // the collections are left consistent between statements, so a panic elsewhere does not
    // invalidate them
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<V, const RANK: usize> ArrayPartitionIO<V, RANK> {
    /// Creates the record of a partition of `partition_shape` that waits for material at
    /// `input_cells`, which must lie on the border of the partition.
    pub fn new(partition_shape: Shape<RANK>, input_cells: Vec<Indices<RANK>>) -> Self {
        let io = Self {
            partition_shape,
            input_cells: Mutex::new(input_cells),
            offsets: Mutex::default(),
            values: Mutex::default(),
        };
        io.assert_invariants();
        io
    }

    pub fn partition_shape(&self) -> &Shape<RANK> {
        &self.partition_shape
    }

    /// Records that material `value` leaves the partition at `output_cell`, towards the cell at
    /// `offset` from it in a neighbouring partition.
    ///
    /// The output cell must not be recorded already and `offset` must point out of the
    /// partition.
    pub fn add_output_cell(&self, output_cell: Indices<RANK>, offset: Offset<RANK>, value: V) {
        let mut offsets = lock(&self.offsets);
        let mut values = lock(&self.values);
        debug_assert!(
            points_outward(&self.partition_shape, &output_cell, &offset),
            "offset {offset:?} of output cell {output_cell:?} does not leave partition {:?}",
            self.partition_shape
        );
        let previous_offset = offsets.insert(output_cell, offset);
        let previous_value = values.insert(output_cell, value);
        debug_assert!(
            previous_offset.is_none() && previous_value.is_none(),
            "output cell {output_cell:?} recorded twice"
        );
        debug_assert_eq!(offsets.len(), values.len());
    }

    pub fn contains_input_cell(&self, input_cell: &Indices<RANK>) -> bool {
        lock(&self.input_cells).contains(input_cell)
    }

    /// Records that material for `input_cell` has arrived and was folded into the partition.
    pub fn remove_input_cell(&self, input_cell: &Indices<RANK>) {
        let mut input_cells = lock(&self.input_cells);
        let position = input_cells.iter().position(|cell| cell == input_cell);
        debug_assert!(position.is_some(), "{input_cell:?} is not an input cell");
        if let Some(position) = position {
            input_cells.swap_remove(position);
        }
    }

    /// Whether all material from upstream has arrived.
    ///
    /// A solved partition may still have output cells to drain.
    pub fn is_solved(&self) -> bool {
        lock(&self.input_cells).is_empty()
    }

    pub fn nr_input_cells(&self) -> usize {
        lock(&self.input_cells).len()
    }

    /// Whether all output cells have been forwarded.
    pub fn is_drained(&self) -> bool {
        lock(&self.offsets).is_empty()
    }

    /// Directions of the neighbouring partitions that output cells currently drain into.
    pub fn partition_offsets(&self) -> BTreeSet<Offset<RANK>> {
        lock(&self.offsets)
            .iter()
            .map(|(cell, offset)| self.partition_offset(cell, offset))
            .collect()
    }

    /// Like [`partition_offsets`](Self::partition_offsets), with the number of output cells per
    /// direction, in order of first appearance.
    pub fn partition_offset_counts(&self) -> PartitionOffsetCounts<RANK> {
        let mut counts = PartitionOffsetCounts::new();
        for (cell, offset) in lock(&self.offsets).iter() {
            let partition_offset = self.partition_offset(cell, offset);
            match counts.iter_mut().find(|(seen, _)| *seen == partition_offset) {
                Some((_, count)) => *count += 1,
                None => counts.push((partition_offset, 1)),
            }
        }
        counts
    }

    /// Removes all output cells draining into the neighbour at `partition_offset` and returns
    /// the cells they drain into, in the neighbour's coordinates, along with their values.
    ///
    /// `neighbour_shape` is the shape of the receiving partition.
    pub fn drain(
        &self,
        partition_offset: &Offset<RANK>,
        neighbour_shape: &Shape<RANK>,
    ) -> Vec<(Indices<RANK>, V)> {
        debug_assert!(
            shape::is_unit_offset(partition_offset),
            "{partition_offset:?} does not name a neighbour"
        );
        let _input_cells = lock(&self.input_cells);
        let mut offsets = lock(&self.offsets);
        let mut values = lock(&self.values);
        debug_assert!(!offsets.is_empty(), "draining a drained partition");

        let mut drained = Vec::new();
        offsets.retain(|cell, offset| {
            if self.partition_offset(cell, offset) != *partition_offset {
                return true;
            }
            let target = input_cell(&self.partition_shape, cell, offset, neighbour_shape);
            debug_assert!(
                shape::is_within(&target, neighbour_shape),
                "{cell:?} drains to {target:?}, outside of neighbour {neighbour_shape:?}"
            );
            match values.remove(cell) {
                Some(value) => drained.push((target, value)),
                None => debug_assert!(false, "output cell {cell:?} without value"),
            }
            false
        });
        debug_assert_eq!(offsets.len(), values.len());
        drained
    }

    /// Direction of the neighbouring partition the cell at `offset` from `cell` lies in.
    fn partition_offset(&self, cell: &Indices<RANK>, offset: &Offset<RANK>) -> Offset<RANK> {
        std::array::from_fn(|d| {
            if cell[d] == 0 && offset[d] == -1 {
                -1
            } else if cell[d] + 1 == self.partition_shape[d] && offset[d] == 1 {
                1
            } else {
                0
            }
        })
    }

    /// Input cells that are still waiting for material.
    pub fn input_cells(&self) -> Vec<Indices<RANK>> {
        lock(&self.input_cells).clone()
    }

    pub fn offsets(&self) -> BTreeMap<Indices<RANK>, Offset<RANK>> {
        lock(&self.offsets).clone()
    }

    pub fn values(&self) -> BTreeMap<Indices<RANK>, V>
    where
        V: Clone,
    {
        lock(&self.values).clone()
    }

    /// Checks the structural invariants, in debug builds only.
    ///
    /// - every output cell has both an offset and a value,
    /// - input cells lie on the partition's border,
    /// - offsets point out of the partition,
    /// - an empty partition has no cells at all.
    pub fn assert_invariants(&self) {
        if cfg!(debug_assertions) {
            let input_cells = lock(&self.input_cells);
            let offsets = lock(&self.offsets);
            let values = lock(&self.values);
            let shape = &self.partition_shape;

            assert_eq!(offsets.len(), values.len());
            assert!(offsets.keys().eq(values.keys()));
            if shape::is_empty(shape) {
                assert!(input_cells.is_empty() && offsets.is_empty());
            }
            for cell in input_cells.iter() {
                assert!(
                    shape::is_within(cell, shape) && shape::on_border(cell, shape),
                    "input cell {cell:?} not on the border of {shape:?}"
                );
            }
            for (cell, offset) in offsets.iter() {
                assert!(
                    points_outward(shape, cell, offset),
                    "offset {offset:?} of output cell {cell:?} does not leave {shape:?}"
                );
            }
        }
    }
}

/// Whether stepping `offset` from `cell` leaves a partition of `shape` along some dimension.
fn points_outward<const RANK: usize>(
    shape: &Shape<RANK>,
    cell: &Indices<RANK>,
    offset: &Offset<RANK>,
) -> bool {
    (0..RANK).any(|d| (cell[d] == 0 && offset[d] < 0) || (cell[d] + 1 == shape[d] && offset[d] > 0))
}

/// The cell `offset` away from `cell`, in the coordinates of the neighbouring partition of
/// `neighbour_shape` it lies in.
fn input_cell<const RANK: usize>(
    shape: &Shape<RANK>,
    cell: &Indices<RANK>,
    offset: &Offset<RANK>,
    neighbour_shape: &Shape<RANK>,
) -> Indices<RANK> {
    std::array::from_fn(|d| {
        if cell[d] == 0 && offset[d] == -1 {
            neighbour_shape[d] - 1
        } else if cell[d] + 1 == shape[d] && offset[d] == 1 {
            0
        } else {
            cell[d].wrapping_add_signed(isize::from(offset[d]))
        }
    })
}

impl<V, const RANK: usize> Default for ArrayPartitionIO<V, RANK> {
    fn default() -> Self {
        Self::new([0; RANK], Vec::new())
    }
}

impl<V: Clone, const RANK: usize> Clone for ArrayPartitionIO<V, RANK> {
    fn clone(&self) -> Self {
        let input_cells = lock(&self.input_cells);
        let offsets = lock(&self.offsets);
        let values = lock(&self.values);
        Self {
            partition_shape: self.partition_shape,
            input_cells: Mutex::new(input_cells.clone()),
            offsets: Mutex::new(offsets.clone()),
            values: Mutex::new(values.clone()),
        }
    }
}

impl<V: fmt::Debug, const RANK: usize> fmt::Debug for ArrayPartitionIO<V, RANK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let input_cells = lock(&self.input_cells);
        let offsets = lock(&self.offsets);
        let values = lock(&self.values);
        f.debug_struct("ArrayPartitionIO")
            .field("partition_shape", &self.partition_shape)
            .field("input_cells", &*input_cells)
            .field("offsets", &*offsets)
            .field("values", &*values)
            .finish()
    }
}

#[cfg(feature = "serde")]
mod wire {
    use super::{ArrayPartitionIO, lock};
    use ::serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
    use smallvec::SmallVec;
    use std::{collections::BTreeMap, sync::Mutex};

    type Components<T> = SmallVec<[T; 4]>;

    /// Wire form: rank-agnostic, and with output cells as a list since map keys must be strings
    /// in some formats.
    #[derive(Serialize, Deserialize)]
    struct Record<V> {
        partition_shape: Components<usize>,
        input_cells: Vec<Components<usize>>,
        output_cells: Vec<(Components<usize>, Components<i8>, V)>,
    }

    fn fixed<T: Copy, E: Error, const RANK: usize>(components: &[T]) -> Result<[T; RANK], E> {
        components.try_into().map_err(|_| {
            E::custom(format!(
                "expected {RANK} components, got {}",
                components.len()
            ))
        })
    }

    impl<V: Clone + Serialize, const RANK: usize> Serialize for ArrayPartitionIO<V, RANK> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let input_cells = lock(&self.input_cells);
            let offsets = lock(&self.offsets);
            let values = lock(&self.values);
            let record = Record {
                partition_shape: SmallVec::from_slice(&self.partition_shape),
                input_cells: input_cells
                    .iter()
                    .map(|cell| SmallVec::from_slice(cell))
                    .collect(),
                output_cells: offsets
                    .iter()
                    .zip(values.values())
                    .map(|((cell, offset), value)| {
                        (
                            SmallVec::from_slice(cell),
                            SmallVec::from_slice(offset),
                            value.clone(),
                        )
                    })
                    .collect(),
            };
            record.serialize(serializer)
        }
    }

    impl<'de, V: Deserialize<'de>, const RANK: usize> Deserialize<'de> for ArrayPartitionIO<V, RANK> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let record = Record::<V>::deserialize(deserializer)?;
            let input_cells = record
                .input_cells
                .iter()
                .map(|cell| fixed(cell.as_slice()))
                .collect::<Result<Vec<_>, D::Error>>()?;
            let mut offsets = BTreeMap::new();
            let mut values = BTreeMap::new();
            for (cell, offset, value) in record.output_cells {
                let cell = fixed::<_, D::Error, RANK>(cell.as_slice())?;
                offsets.insert(cell, fixed::<_, D::Error, RANK>(offset.as_slice())?);
                values.insert(cell, value);
            }
            let io = Self {
                partition_shape: fixed::<_, D::Error, RANK>(record.partition_shape.as_slice())?,
                input_cells: Mutex::new(input_cells),
                offsets: Mutex::new(offsets),
                values: Mutex::new(values),
            };
            io.assert_invariants();
            Ok(io)
        }
    }
}
