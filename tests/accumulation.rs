use std::collections::BTreeMap;
use tessera::{Array, ArrayPartitionIO, Indices, shape};

type Grid = Array<ArrayPartitionIO<f64, 2>, 2>;

const PARTITION_SHAPE: [usize; 2] = [3, 3];

/// Forwards all output cells of `partition` into its neighbours, returning what arrived where.
fn forward(grid: &Grid, partition: Indices<2>) -> Vec<(Indices<2>, Indices<2>, f64)> {
    let io = &grid[partition];
    let mut arrived = Vec::new();
    for offset in io.partition_offsets() {
        let target = shape::neighbour(&partition, &offset, grid.shape()).unwrap();
        let receiver = &grid[target];
        for (cell, value) in io.drain(&offset, receiver.partition_shape()) {
            assert!(receiver.contains_input_cell(&cell), "{target:?} {cell:?}");
            receiver.remove_input_cell(&cell);
            arrived.push((target, cell, value));
        }
    }
    arrived
}

// A 6x6 array in 3x3 partitions. A stream enters the north-east partition from the west, and
// leaves it again diagonally towards the south-west. A second stream crosses the corner
// between the north-west and south-east partitions.
fn network() -> Grid {
    Array::from_fn([2, 2], |partition| {
        let input_cells = match partition {
            [0, 1] => vec![[1, 0]],
            [1, 0] => vec![[0, 2]],
            [1, 1] => vec![[0, 0]],
            _ => Vec::new(),
        };
        ArrayPartitionIO::new(PARTITION_SHAPE, input_cells)
    })
}

#[test]
fn material_crosses_partitions() {
    let grid = network();
    let north_west = &grid[[0, 0]];
    north_west.add_output_cell([1, 2], [0, 1], 2.0);
    north_west.add_output_cell([2, 2], [1, 1], 5.0);
    assert!(north_west.is_solved());
    assert_eq!(
        north_west.partition_offset_counts().into_vec(),
        vec![([0, 1], 1), ([1, 1], 1)]
    );

    let arrived = forward(&grid, [0, 0]);
    assert_eq!(
        arrived,
        vec![([0, 1], [1, 0], 2.0), ([1, 1], [0, 0], 5.0)]
    );
    assert!(north_west.is_drained());
    assert!(grid[[1, 1]].is_solved());

    // the north-east partition can route its stream now that its input arrived
    let north_east = &grid[[0, 1]];
    assert!(north_east.is_solved());
    north_east.add_output_cell([2, 0], [1, -1], 2.0 + 1.0);
    assert_eq!(
        north_east.partition_offsets().into_iter().collect::<Vec<_>>(),
        vec![[1, -1]]
    );

    let arrived = forward(&grid, [0, 1]);
    assert_eq!(arrived, vec![([1, 0], [0, 2], 3.0)]);

    for io in grid.iter() {
        io.assert_invariants();
        assert!(io.is_solved() && io.is_drained());
    }
}

#[test]
fn partly_drained_partitions_keep_the_rest() {
    let io = ArrayPartitionIO::new(PARTITION_SHAPE, vec![[0, 1], [2, 1]]);
    io.add_output_cell([0, 0], [-1, -1], 1.0);
    io.add_output_cell([1, 0], [0, -1], 2.0);
    io.add_output_cell([2, 0], [0, -1], 3.0);
    io.add_output_cell([2, 2], [1, 0], 4.0);

    let west = io.drain(&[0, -1], &[3, 2]);
    assert_eq!(west, vec![([1, 1], 2.0), ([2, 1], 3.0)]);
    assert!(!io.is_drained());

    let remaining: BTreeMap<_, _> = io.values();
    assert_eq!(remaining, BTreeMap::from([([0, 0], 1.0), ([2, 2], 4.0)]));
    assert_eq!(
        io.partition_offsets().into_iter().collect::<Vec<_>>(),
        vec![[-1, -1], [1, 0]]
    );

    io.remove_input_cell(&[2, 1]);
    assert_eq!(io.input_cells(), vec![[0, 1]]);
    assert_eq!(io.nr_input_cells(), 1);
}

#[test]
fn single_row_partitions() {
    // every cell of a single row lies on both the northern and the southern border
    let io = ArrayPartitionIO::new([1, 4], vec![[0, 1]]);
    io.add_output_cell([0, 2], [-1, 0], 1.5);
    io.add_output_cell([0, 3], [1, 1], 2.5);
    assert_eq!(
        io.partition_offsets().into_iter().collect::<Vec<_>>(),
        vec![[-1, 0], [1, 1]]
    );
    assert_eq!(io.drain(&[-1, 0], &[2, 4]), vec![([1, 2], 1.5)]);
    assert_eq!(io.drain(&[1, 1], &[5, 5]), vec![([0, 0], 2.5)]);
    assert!(io.is_drained());
}
