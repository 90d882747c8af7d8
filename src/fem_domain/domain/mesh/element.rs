use super::space::{Point, M2D, V2D};
use json::{array, object, JsonValue};

/// The `Element`s are the basic geometric unit of the Mesh in Real Space.
///
/// Elements are responsible for:
/// * Keeping a bilinear mapping between Real and Parametric Space in their region of the Mesh
/// * Keeping track of the material region that their portion of the Mesh belongs to
///
/// JSON mesh files describe the `Element`s in the domain; not the `Elem`s
/// Upon `Mesh` construction, each `Element` has one associated `Elem`, but more can be added through h-Refinements
///
/// Points are stored in the order: SW, SE, NW, NE
#[derive(Debug)]
pub struct Element {
    pub id: usize,
    pub points: [Point; 4],
    pub material: String,
}

impl Element {
    /// Create a new element defined by its coordinates in real space and the name of its material region
    pub fn new(id: usize, points: [Point; 4], material: impl Into<String>) -> Self {
        Self {
            id,
            points,
            material: material.into(),
        }
    }

    /// Map a point in the Element's parametric space (`[-1, 1] x [-1, 1]`) into Real Space
    pub fn map(&self, u: f64, v: f64) -> Point {
        let weights = bilinear_weights(u, v);
        let (x, y) = self
            .points
            .iter()
            .zip(weights.iter())
            .fold((0.0, 0.0), |(x, y), (p, w)| (x + p.x * w, y + p.y * w));
        Point::new(x, y)
    }

    /// Jacobian of the bilinear map at a point in parametric space
    pub fn jacobian(&self, u: f64, v: f64) -> M2D {
        let d_du = [-(1.0 - v), 1.0 - v, -(1.0 + v), 1.0 + v];
        let d_dv = [-(1.0 - u), -(1.0 + u), 1.0 - u, 1.0 + u];

        let mut j = [[0.0; 2]; 2];
        for (p, (du, dv)) in self.points.iter().zip(d_du.iter().zip(d_dv.iter())) {
            j[0][0] += p.x * du / 4.0;
            j[0][1] += p.x * dv / 4.0;
            j[1][0] += p.y * du / 4.0;
            j[1][1] += p.y * dv / 4.0;
        }

        M2D::from(j[0], j[1])
    }

    /// Get the mapping between Real Space and a sub-region (`over_range`) of the Element's Parametric Space
    ///
    /// `parametric_point` is given in the local coordinates of the sub-region (`[-1, 1] x [-1, 1]`)
    pub fn parametric_mapping(
        &self,
        parametric_point: V2D,
        [[u_min, u_max], [v_min, v_max]]: [[f64; 2]; 2],
    ) -> M2D {
        let u = map_range(parametric_point[0], -1.0, 1.0, u_min, u_max);
        let v = map_range(parametric_point[1], -1.0, 1.0, v_min, v_max);

        self.jacobian(u, v)
            .scale_columns([(u_max - u_min) / 2.0, (v_max - v_min) / 2.0])
    }

    /// Map a point in the local coordinates of a sub-region into Real Space
    pub fn map_sub_region(
        &self,
        parametric_point: V2D,
        [[u_min, u_max], [v_min, v_max]]: [[f64; 2]; 2],
    ) -> Point {
        self.map(
            map_range(parametric_point[0], -1.0, 1.0, u_min, u_max),
            map_range(parametric_point[1], -1.0, 1.0, v_min, v_max),
        )
    }

    /// Is the bilinear map orientation preserving at all four corners
    pub fn is_valid(&self) -> bool {
        [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]
            .iter()
            .all(|[u, v]| self.jacobian(*u, *v).det() > 0.0)
    }

    /// Produce a Json Object that describes this Element
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "material": self.material.as_str(),
            "points": array![self.points[0], self.points[1], self.points[2], self.points[3]],
        }
    }
}

pub(crate) fn map_range(val: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (val - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

fn bilinear_weights(u: f64, v: f64) -> [f64; 4] {
    [
        (1.0 - u) * (1.0 - v) / 4.0,
        (1.0 + u) * (1.0 - v) / 4.0,
        (1.0 - u) * (1.0 + v) / 4.0,
        (1.0 + u) * (1.0 + v) / 4.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed() -> Element {
        Element::new(
            0,
            [
                Point::new(0.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(0.5, 1.0),
                Point::new(2.5, 1.5),
            ],
            "Copper",
        )
    }

    #[test]
    fn corners_map_to_points() {
        let e = skewed();
        assert_eq!(e.map(-1.0, -1.0), e.points[0]);
        assert_eq!(e.map(1.0, -1.0), e.points[1]);
        assert_eq!(e.map(-1.0, 1.0), e.points[2]);
        assert_eq!(e.map(1.0, 1.0), e.points[3]);
        assert!(e.is_valid());
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let e = skewed();
        let (u, v, h) = (0.3, -0.2, 1e-6);
        let j = e.jacobian(u, v);

        let dx_du = (e.map(u + h, v).x - e.map(u - h, v).x) / (2.0 * h);
        let dy_dv = (e.map(u, v + h).y - e.map(u, v - h).y) / (2.0 * h);

        assert!((j.u[0] - dx_du).abs() < 1e-8);
        assert!((j.v[1] - dy_dv).abs() < 1e-8);
    }

    #[test]
    fn sub_region_mapping() {
        let e = skewed();
        let range = [[0.0, 1.0], [-1.0, 0.0]];
        let center = e.map_sub_region(V2D::from([0.0, 0.0]), range);
        assert_eq!(center, e.map(0.5, -0.5));

        let full = e.jacobian(0.5, -0.5);
        let sub = e.parametric_mapping(V2D::from([0.0, 0.0]), range);
        assert!((sub.det() - full.det() / 4.0).abs() < 1e-12);
    }
}
