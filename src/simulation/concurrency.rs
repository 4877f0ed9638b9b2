pub use internal::*;

#[cfg(target_arch = "wasm32")]
mod internal {

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &mut T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.iter_mut()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .fold(identity(), |acc, value| combine(acc, value))
    }

    pub fn par_iter_reduce5<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        T4: Send + Sync,
        T5: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3, &mut T4, &mut T5) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        arr4: &mut [T4],
        arr5: &mut [T5],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.iter_mut()
            .zip(arr2.iter_mut())
            .zip(arr3.iter_mut())
            .zip(arr4.iter_mut())
            .zip(arr5.iter_mut())
            .enumerate()
            .map(|(i, ((((v1, v2), v3), v4), v5))| f(i, v1, v2, v3, v4, v5))
            .fold(identity(), |acc, value| combine(acc, value))
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod internal {
    use rayon::prelude::*;

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &mut T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.into_par_iter()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .reduce(identity, combine)
    }

    pub fn par_iter_reduce5<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        T4: Send + Sync,
        T5: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3, &mut T4, &mut T5) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        arr4: &mut [T4],
        arr5: &mut [T5],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.into_par_iter()
            .zip(arr2.into_par_iter())
            .zip(arr3.into_par_iter())
            .zip(arr4.into_par_iter())
            .zip(arr5.into_par_iter())
            .enumerate()
            .map(|(i, ((((v1, v2), v3), v4), v5))| f(i, v1, v2, v3, v4, v5))
            .reduce(identity, combine)
    }
}

#[test]
fn reduce_visits_every_index_once() {
    let mut a: Vec<usize> = vec![0; 1000];
    let mut b: Vec<f32> = vec![1.; 1000];
    let mut c: Vec<u8> = vec![0; 1000];
    let mut d: Vec<u8> = vec![0; 1000];
    let mut e: Vec<u8> = vec![0; 1000];

    let sum = par_iter_reduce5(
        &mut a,
        &mut b,
        &mut c,
        &mut d,
        &mut e,
        || 0,
        |x, y| x + y,
        |i, p_a, p_b, _, _, p_e| {
            *p_a = i;
            *p_b *= 2.;
            *p_e = 1;
            i
        },
    );

    assert_eq!(sum, 999 * 1000 / 2);
    assert!(a.iter().enumerate().all(|(i, &x)| i == x));
    assert!(b.iter().all(|&x| x == 2.));
    assert!(e.iter().all(|&x| x == 1));

    let max = par_iter_reduce1(&mut a, || 0, usize::max, |_, p_a| *p_a);
    assert_eq!(max, 999);
}
