use tessera::{
    Array, Cluster, EngineConfig, PartitionedArray, StepGate, array,
    create_partitioned_array_filled, create_partitioned_array_from_buffer,
    focal::{
        Aggregator, FocalFunction, FocalPolicies, HaloPolicy, Kernel, focal_center,
        focal_diversity, focal_majority, focal_operation, focal_sum,
    },
};

const ND: i32 = i32::MIN;

fn cluster(nr_nodes: usize) -> Cluster {
    Cluster::from_current(nr_nodes, EngineConfig::for_testing()).unwrap()
}

fn render<T: ToString>(array: &Array<T, 2>) -> String {
    array
        .rows()
        .map(|row| {
            row.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn grid_with_no_data() -> Array<i32, 2> {
    array![
        [1, 1, 1, -4, -4],
        [2, ND, 2, -4, -4],
        [3, 6, 3, 3, 3],
        [4, 2, 3, 3, 3],
        [0, 14, 3, -1, 0],
    ]
}

fn partitioned(
    cluster: &Cluster,
    data: &Array<i32, 2>,
    partition_shape: [usize; 2],
) -> PartitionedArray<i32, 2> {
    create_partitioned_array_from_buffer(
        cluster,
        *data.shape(),
        partition_shape,
        data.as_slice().to_vec(),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn majority_of_a_grid_with_no_data() {
    let cluster = cluster(2);
    for partition_shape in [[5, 5], [3, 3], [3, 5], [5, 3]] {
        let input = partitioned(&cluster, &grid_with_no_data(), partition_shape);
        let output = focal_majority(
            &input,
            &Kernel::box_kernel(1, true),
            FocalPolicies::with_no_data(ND, ND),
        )
        .unwrap();
        let rendered = render(&output.to_array().await.unwrap());
        insta::allow_duplicates! {
            insta::assert_snapshot!(rendered, @r"
            1 1 -4 -4 -4
            1 1 -4 -4 -4
            2 2 3 3 3
            0 3 3 3 3
            0 3 3 3 3
            ");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn diversity_of_a_grid_with_no_data() {
    let cluster = cluster(3);
    for partition_shape in [[5, 5], [3, 3]] {
        let input = partitioned(&cluster, &grid_with_no_data(), partition_shape);
        let output = focal_diversity(
            &input,
            &Kernel::box_kernel(1, true),
            FocalPolicies::with_no_data(ND, 0),
        )
        .unwrap();
        let rendered = render(&output.to_array().await.unwrap());
        insta::allow_duplicates! {
            insta::assert_snapshot!(rendered, @r"
            2 2 3 3 1
            4 4 5 4 2
            4 4 4 3 2
            6 6 5 3 3
            4 5 4 3 3
            ");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn diversity_of_distinct_values_counts_the_footprint() {
    let cluster = cluster(4);
    let values: Vec<i32> = (1..=81).collect();
    let input = create_partitioned_array_from_buffer(&cluster, [9, 9], [3, 3], values).unwrap();
    let output = focal_diversity(
        &input,
        &Kernel::box_kernel(1, true),
        FocalPolicies::with_no_data(ND, 0),
    )
    .unwrap();
    let result = output.to_array().await.unwrap();
    for ([row, col], &count) in result.indexed_iter() {
        let border_rows = usize::from(row == 0 || row == 8);
        let border_cols = usize::from(col == 0 || col == 8);
        assert_eq!(
            count,
            ((3 - border_rows) * (3 - border_cols)) as u64,
            "cell ({row}, {col})"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn center_kernel_leaves_uniform_arrays_alone() {
    let cluster = cluster(3);
    for partition_shape in [[10, 10], [5, 5], [7, 7], [10, 5], [7, 5]] {
        let input = create_partitioned_array_filled(&cluster, [10, 10], partition_shape, 7_i16)
            .unwrap();
        let policies = FocalPolicies::with_fill_value(-1)
            .with_halo(HaloPolicy::uniform(-2).with_corners(-3));
        let output = focal_center(&input, &Kernel::center(2), policies).unwrap();
        let result = output.to_array().await.unwrap();
        assert!(
            result.iter().all(|&v| v == 7),
            "partition shape {partition_shape:?}: {result:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn single_row_and_column_grids() {
    let cluster = cluster(2);
    for (shape, partition_shape) in [([4, 12], [4, 3]), ([12, 4], [3, 4]), ([4, 4], [4, 4])] {
        let input = create_partitioned_array_filled(&cluster, shape, partition_shape, 1_u32)
            .unwrap();
        let output = focal_sum(
            &input,
            &Kernel::box_kernel(1, true),
            FocalPolicies::with_fill_value(0),
        )
        .unwrap();
        let result = output.to_array().await.unwrap();
        let [height, width] = shape;
        for ([row, col], &sum) in result.indexed_iter() {
            let rows = 3 - usize::from(row == 0) - usize::from(row + 1 == height);
            let cols = 3 - usize::from(col == 0) - usize::from(col + 1 == width);
            assert_eq!(sum as usize, rows * cols, "{shape:?} cell ({row}, {col})");
        }
    }
}

/// Sum of the weighted values, to check that kernel weights reach the aggregator in order.
struct WeightedSum;

struct WeightedSumAggregator(i64);

impl Aggregator<i64, i64> for WeightedSumAggregator {
    type Output = i64;

    fn add(&mut self, weight: &i64, value: &i64) {
        self.0 += weight * value;
    }

    fn finish(self) -> i64 {
        self.0
    }
}

impl FocalFunction<i64, i64> for WeightedSum {
    type Output = i64;
    type Aggregator = WeightedSumAggregator;

    fn aggregator(&self, _policies: &FocalPolicies<i64, i64>) -> WeightedSumAggregator {
        WeightedSumAggregator(0)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_functions_see_weights_and_neighbours() {
    let cluster = cluster(2);
    let values: Vec<i64> = (0..36).collect();
    let input = create_partitioned_array_from_buffer(&cluster, [6, 6], [2, 3], values).unwrap();

    // picks the western neighbour
    let weights = array![[0_i64, 0, 0], [1, 0, 0], [0, 0, 0]];
    let kernel = Kernel::from_weights(1, weights).unwrap();
    let output = focal_operation(
        &input,
        &kernel,
        WeightedSum,
        FocalPolicies::with_fill_value(-100),
    )
    .unwrap();
    let result = output.to_array().await.unwrap();
    let expected = Array::from_fn([6, 6], |[row, col]| {
        if col == 0 {
            -100
        } else {
            (row * 6 + col - 1) as i64
        }
    });
    assert_eq!(result, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn time_steps_through_a_step_gate() {
    let cluster = cluster(3);
    let gate = StepGate::new(2).unwrap();
    let mut state = create_partitioned_array_filled(&cluster, [9, 9], [3, 3], 1_i64).unwrap();
    for _ in 0..6 {
        let permit = gate.enter().await.unwrap();
        assert!(gate.in_flight() <= 2);
        state = focal_center(
            &state,
            &Kernel::center(1),
            FocalPolicies::with_fill_value(0),
        )
        .unwrap();
        permit.release_when_ready(&state);
    }
    let result = state.to_array().await.unwrap();
    assert!(result.iter().all(|&v| v == 1));
}
