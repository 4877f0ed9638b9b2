use crate::{floating_type_mod::FT, V3};

/// The value of pi the solver kernels were tuned with.
#[allow(clippy::approx_constant, clippy::excessive_precision)]
pub const KERNEL_PI: FT = 3.1415926;

/**
 * Density kernel. `r` is the distance between the two particles and `h` the
 * smoothing radius.
 *
 * The bracket is evaluated as `1 - ((r * r / h) * h)`, so the smoothing radius
 * cancels and the bracket is `1 - r^2`. Only the normalization factor and the
 * compact support depend on `h`.
 */
#[allow(clippy::precedence)]
pub fn kernel(r: FT, h: FT) -> FT {
    if r >= h {
        return 0.;
    }
    let q = 1. - (r * r / h * h);
    (315. / (64. * KERNEL_PI * h * h * h)) * q * q
}

/**
 * First radial derivative of the falloff used for the pressure gradient.
 */
pub fn first_derivative(r: FT, h: FT) -> FT {
    if r >= h {
        return 0.;
    }
    let q = 1. - r / h;
    (-45. / (KERNEL_PI * h * h * h * h)) * q * q
}

/**
 * Second radial derivative of the falloff used for the viscosity Laplacian.
 */
pub fn second_derivative(r: FT, h: FT) -> FT {
    if r >= h {
        return 0.;
    }
    let q = 1. - r / h;
    (90. / (KERNEL_PI * h * h * h * h * h)) * q
}

/**
 * Kernel gradient along `dir`, the (unnormalized) difference of the two
 * particle positions.
 */
pub fn gradient(r: FT, h: FT, dir: V3) -> V3 {
    if r >= h {
        return V3::zeros();
    }
    dir * -first_derivative(r, h)
}

/// Adaptive step multiplier used for prediction and final integration.
pub fn cfl_factor(max_speed: FT) -> FT {
    if max_speed > 2.0 {
        return 1. / max_speed;
    }
    0.5
}

#[test]
fn kernels_vanish_outside_support() {
    use crate::vec3f;

    for h in [0.1, 0.5, 1., 3.] {
        for factor in [1., 1.0001, 1.5, 10.] {
            let r = h * factor;
            assert_eq!(kernel(r, h), 0.);
            assert_eq!(first_derivative(r, h), 0.);
            assert_eq!(second_derivative(r, h), 0.);
            assert_eq!(gradient(r, h, vec3f(r, 0., 0.)), V3::zeros());
        }
    }
}

#[test]
fn density_kernel_bracket_ignores_smoothing_radius() {
    use crate::assert_ft_approx_eq;

    let h: FT = 0.5;
    let r: FT = 0.25;

    let bracket: FT = 1. - r * r;
    let expected = 315. / (64. * KERNEL_PI * h * h * h) * bracket * bracket;
    assert_ft_approx_eq(kernel(r, h), expected, 1e-4, || "kernel(0.25, 0.5)".to_string());

    // the textbook bracket 1 - (r/h)^2 gives a different value
    let textbook_bracket: FT = 1. - (r / h) * (r / h);
    let textbook = 315. / (64. * KERNEL_PI * h * h * h) * textbook_bracket * textbook_bracket;
    assert!((kernel(r, h) - textbook).abs() > 1.);

    // at the center only the normalization is left
    assert_ft_approx_eq(kernel(0., h), 315. / (64. * KERNEL_PI * h * h * h), 1e-4, || {
        "kernel(0, 0.5)".to_string()
    });
}

#[test]
fn derivatives_match_closed_form() {
    use crate::assert_ft_approx_eq;

    let h: FT = 2.;
    let r: FT = 0.5;
    let q: FT = 1. - r / h;

    assert_ft_approx_eq(first_derivative(r, h), -45. / (KERNEL_PI * 16.) * q * q, 1e-6, || {
        "first derivative".to_string()
    });
    assert_ft_approx_eq(second_derivative(r, h), 90. / (KERNEL_PI * 32.) * q, 1e-6, || {
        "second derivative".to_string()
    });
    assert!(first_derivative(r, h) < 0.);
    assert!(second_derivative(r, h) > 0.);
}

#[test]
fn gradient_points_along_direction() {
    use crate::vec3f;

    let h: FT = 1.;
    let dir = vec3f(0.3, 0., 0.);
    let grad = gradient(0.3, h, dir);

    // the first derivative is negative, so the gradient points along `dir`
    assert!(grad.x > 0.);
    assert_eq!(grad.y, 0.);
    assert_eq!(grad.z, 0.);
    assert_eq!(grad, dir * -first_derivative(0.3, h));
}

#[test]
fn cfl_factor_switches_above_two() {
    assert_eq!(cfl_factor(0.), 0.5);
    assert_eq!(cfl_factor(2.), 0.5);
    assert_eq!(cfl_factor(4.), 0.25);
    assert_eq!(cfl_factor(10.), 0.1);
}
