use super::galerkin::AssemblyError;
use super::integration::ShapeSample;
use crate::fem_domain::domain::mesh::space::{Point, V2D};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A scalar coefficient which varies over real space (conductivity, heat source density, etc.)
pub type CoefficientFn = Arc<dyn Fn(&Point) -> f64 + Send + Sync>;

/// The integrand of a symmetric bilinear form `a(u, v)`
///
/// Implementations are evaluated concurrently over many Elems, so they must be `Send + Sync`.
pub trait BilinearForm: Send + Sync {
    /// Value of the integrand at a real-space point, given samples of the trial function `u` and test function `v`
    fn integrand(&self, point: &Point, u: &ShapeSample, v: &ShapeSample) -> f64;
}

/// The integrand of a linear form `l(v)`
pub trait LinearForm: Send + Sync {
    /// Value of the integrand at a real-space point, given a sample of the test function `v`
    fn integrand(&self, point: &Point, v: &ShapeSample) -> f64;
}

/// Heat conduction: `a(u, v) = λ(x) ∇u · ∇v`
#[derive(Clone)]
pub struct DiffusionForm {
    conductivity: CoefficientFn,
}

impl DiffusionForm {
    pub fn new(conductivity: CoefficientFn) -> Self {
        Self { conductivity }
    }
}

impl BilinearForm for DiffusionForm {
    #[inline]
    fn integrand(&self, point: &Point, u: &ShapeSample, v: &ShapeSample) -> f64 {
        (self.conductivity)(point) * V2D::dot(u.grad, v.grad)
    }
}

/// Volumetric heat source: `l(v) = f(x) v`
#[derive(Clone)]
pub struct SourceForm {
    density: CoefficientFn,
}

impl SourceForm {
    pub fn new(density: CoefficientFn) -> Self {
        Self { density }
    }
}

impl LinearForm for SourceForm {
    #[inline]
    fn integrand(&self, point: &Point, v: &ShapeSample) -> f64 {
        (self.density)(point) * v.value
    }
}

/// The forms which apply over a single Elem
#[derive(Clone, Copy)]
pub struct ElemForms<'w> {
    pub bilinear: &'w dyn BilinearForm,
    pub linear: Option<&'w dyn LinearForm>,
}

/// The weak formulation of a stationary heat conduction problem
///
/// Each material region of the Mesh needs a bilinear form (usually its conductivity). A source term can be defined
/// over every region at once, and overridden per region.
///
/// ```
/// use heat_fem_2d::fem_problem::weak_form::WeakForm;
///
/// let wf = WeakForm::new()
///     .with_constant_diffusion("Aluminum", 236.0)
///     .with_constant_diffusion("Copper", 386.0)
///     .with_constant_source(500.0);
///
/// assert!(wf.forms_for("Copper").is_ok());
/// assert!(wf.forms_for("Copper").unwrap().linear.is_some());
/// assert!(wf.forms_for("Steel").is_err());
/// ```
#[derive(Clone, Default)]
pub struct WeakForm {
    bilinear: BTreeMap<String, Arc<dyn BilinearForm>>,
    source: Option<Arc<dyn LinearForm>>,
    region_sources: BTreeMap<String, Arc<dyn LinearForm>>,
}

impl WeakForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conduct heat over `region` with a spatially varying conductivity
    pub fn with_diffusion<F>(self, region: impl Into<String>, conductivity: F) -> Self
    where
        F: Fn(&Point) -> f64 + Send + Sync + 'static,
    {
        self.with_bilinear_form(region, DiffusionForm::new(Arc::new(conductivity)))
    }

    pub fn with_constant_diffusion(self, region: impl Into<String>, conductivity: f64) -> Self {
        self.with_diffusion(region, move |_| conductivity)
    }

    /// Use an arbitrary (symmetric) bilinear form over `region`
    pub fn with_bilinear_form(
        mut self,
        region: impl Into<String>,
        form: impl BilinearForm + 'static,
    ) -> Self {
        self.bilinear.insert(region.into(), Arc::new(form));
        self
    }

    /// Heat source over every region
    pub fn with_source<F>(mut self, density: F) -> Self
    where
        F: Fn(&Point) -> f64 + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(SourceForm::new(Arc::new(density))));
        self
    }

    pub fn with_constant_source(self, density: f64) -> Self {
        self.with_source(move |_| density)
    }

    /// Heat source over a single region (takes precedence over [WeakForm::with_source])
    pub fn with_region_source<F>(mut self, region: impl Into<String>, density: F) -> Self
    where
        F: Fn(&Point) -> f64 + Send + Sync + 'static,
    {
        self.region_sources.insert(
            region.into(),
            Arc::new(SourceForm::new(Arc::new(density))),
        );
        self
    }

    /// Use an arbitrary linear form over a single region
    pub fn with_linear_form(
        mut self,
        region: impl Into<String>,
        form: impl LinearForm + 'static,
    ) -> Self {
        self.region_sources.insert(region.into(), Arc::new(form));
        self
    }

    /// The forms to integrate over an Elem of a given material region
    pub fn forms_for(&self, region: &str) -> Result<ElemForms<'_>, AssemblyError> {
        let bilinear = self
            .bilinear
            .get(region)
            .ok_or_else(|| AssemblyError::MissingRegion(region.to_string()))?;

        let linear = self
            .region_sources
            .get(region)
            .or(self.source.as_ref())
            .map(|form| form.as_ref());

        Ok(ElemForms {
            bilinear: bilinear.as_ref(),
            linear,
        })
    }

    /// The regions with a bilinear form
    pub fn regions(&self) -> impl Iterator<Item = &str> + '_ {
        self.bilinear.keys().map(|r| r.as_str())
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some() || !self.region_sources.is_empty()
    }
}

impl fmt::Debug for WeakForm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WeakForm")
            .field("regions", &self.bilinear.keys().collect::<Vec<_>>())
            .field("source", &self.source.is_some())
            .field(
                "region_sources",
                &self.region_sources.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64, grad: [f64; 2]) -> ShapeSample {
        ShapeSample {
            value,
            grad: V2D::from(grad),
        }
    }

    #[test]
    fn diffusion_integrand() {
        let wf = WeakForm::new().with_diffusion("Aluminum", |p| 1.0 + p.x);
        let forms = wf.forms_for("Aluminum").unwrap();
        let p = Point::new(2.0, 0.0);

        let value = forms
            .bilinear
            .integrand(&p, &sample(0.0, [1.0, 2.0]), &sample(0.0, [3.0, -1.0]));
        assert!((value - 3.0).abs() < 1e-15);
        assert!(forms.linear.is_none());
    }

    #[test]
    fn region_sources_override_global_source() {
        let wf = WeakForm::new()
            .with_constant_diffusion("Aluminum", 236.0)
            .with_constant_diffusion("Copper", 386.0)
            .with_constant_source(500.0)
            .with_region_source("Copper", |_| -1.0);

        let p = Point::new(0.0, 0.0);
        let v = sample(2.0, [0.0, 0.0]);

        let al = wf.forms_for("Aluminum").unwrap().linear.unwrap();
        let cu = wf.forms_for("Copper").unwrap().linear.unwrap();
        assert!((al.integrand(&p, &v) - 1000.0).abs() < 1e-12);
        assert!((cu.integrand(&p, &v) + 2.0).abs() < 1e-12);

        assert_eq!(wf.regions().collect::<Vec<_>>(), vec!["Aluminum", "Copper"]);
        assert!(wf.has_source());
    }

    struct Radial;

    impl LinearForm for Radial {
        fn integrand(&self, point: &Point, v: &ShapeSample) -> f64 {
            (point.x * point.x + point.y * point.y) * v.value
        }
    }

    #[test]
    fn custom_linear_form() {
        let wf = WeakForm::new()
            .with_constant_diffusion("Copper", 386.0)
            .with_linear_form("Copper", Radial);

        let linear = wf.forms_for("Copper").unwrap().linear.unwrap();
        let value = linear.integrand(&Point::new(3.0, 4.0), &sample(0.5, [0.0, 0.0]));
        assert!((value - 12.5).abs() < 1e-12);
    }

    #[test]
    fn missing_region() {
        let wf = WeakForm::new().with_constant_diffusion("Aluminum", 236.0);
        match wf.forms_for("Copper") {
            Err(AssemblyError::MissingRegion(region)) => assert_eq!(region, "Copper"),
            _ => panic!("expected a MissingRegion error"),
        }
    }
}
