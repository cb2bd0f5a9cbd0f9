use parloop::prelude::*;
use rand::Rng;

#[test]
fn test_sum() {
    let a: Vec<f64> = (1..=100).map(f64::from).collect();
    let sum = par_reduce(100, Reduction::new(|i: i32| a[i as usize], |x, y| x + y));
    assert_eq!(sum, 5050.0);
}

#[test]
fn test_sum_for_any_chunk() {
    let a: Vec<f64> = (1..=100).map(f64::from).collect();
    for chunk in [1, 2, 3, 5, 10, 33, 100] {
        let sum = par_reduce(
            IndexRange::new(0, 100).chunk(chunk),
            Reduction::new(|i: i32| a[i as usize], |x, y| x + y),
        );
        assert_eq!(sum, 5050.0, "chunk {}", chunk);
    }
}

#[test]
fn test_non_commutative_combine() {
    // Singleton lists concatenated pairwise: the result is ordered by index
    // whatever the chunk, because combine keeps lower indices on the left.
    for chunk in [1, 2, 3, 5, 10] {
        let concat = par_reduce(
            IndexRange::new(0, 10).chunk(chunk),
            Reduction::new(
                |i: i32| vec![i],
                |mut x: Vec<i32>, mut y: Vec<i32>| {
                    x.append(&mut y);
                    x
                },
            ),
        );
        assert_eq!(concat, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9], "chunk {}", chunk);
    }
}

#[test]
fn test_string_fold_matches_sequential() {
    let expected: String = (0..50).map(|i| i.to_string()).collect();
    for chunk in [1, 4, 7, 50] {
        let folded = par_reduce(
            IndexRange::new(0, 50).chunk(chunk),
            Reduction::new(|i: i32| i.to_string(), |a, b| a + &b),
        );
        assert_eq!(folded, expected, "chunk {}", chunk);
    }
}

#[test]
fn test_random_values_deterministic() {
    let mut rng = rand::thread_rng();
    let a: Vec<i64> = (0..1000).map(|_| rng.gen_range(-1000..1000)).collect();
    let expected: i64 = a.iter().sum();
    for chunk in [1, 3, 17, 250, 1000] {
        let sum = par_reduce(
            IndexRange::new(0, 1000).chunk(chunk),
            Reduction::new(|i: i32| a[i as usize], |x, y| x + y),
        );
        assert_eq!(sum, expected, "chunk {}", chunk);
    }
}

#[test]
fn test_max_reduction() {
    let mut rng = rand::thread_rng();
    let a: Vec<u32> = (0..5000).map(|_| rng.gen()).collect();
    let expected = *a.iter().max().unwrap();
    let max = par_reduce(
        5000,
        Reduction::new(|i: i32| a[i as usize], |x: u32, y: u32| x.max(y)),
    );
    assert_eq!(max, expected);
}

#[test]
fn test_strided_reduce() {
    let concat = par_reduce(
        IndexRange::new(2, 11).step(3),
        Reduction::new(
            |i: i32| vec![i],
            |mut x: Vec<i32>, mut y: Vec<i32>| {
                x.append(&mut y);
                x
            },
        ),
    );
    assert_eq!(concat, vec![2, 5, 8]);
}

#[test]
fn test_single_index_reduce() {
    let value = par_reduce(7..8, Reduction::new(|i: i32| i * i, |x, y| x + y));
    assert_eq!(value, 49);
}

#[test]
fn test_trait_object_body() {
    struct Count;
    impl ReduceBody<usize> for Count {
        fn compute(&self, _i: i32) -> usize {
            1
        }
        fn combine(&self, v1: usize, v2: usize) -> usize {
            v1 + v2
        }
    }
    assert_eq!(par_reduce(123, Count), 123);
}

#[test]
#[should_panic(expected = "begin < end")]
fn test_empty_range_rejected() {
    par_reduce(5..5, Reduction::new(|i: i32| i, |x, y| x + y));
}

#[test]
#[should_panic(expected = "chunk > 0")]
fn test_zero_chunk_rejected() {
    par_reduce(
        IndexRange::new(0, 10).chunk(0),
        Reduction::new(|i: i32| i, |x, y| x + y),
    );
}
