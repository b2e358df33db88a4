use geo::{BoundingRect, Geometry, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box in single precision.
///
/// Represents a rectangular area defined by minimum and maximum coordinates.
/// Degenerate boxes (points, horizontal or vertical segments) are valid.
/// The special [`BoundingBox2D::empty`] box is inverted so that it is the
/// identity of [`BoundingBox2D::union`] and intersects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox2D {
    /// Create a new bounding box from minimum and maximum coordinates.
    ///
    /// # Arguments
    ///
    /// * `min_x` - Minimum longitude/x coordinate
    /// * `min_y` - Minimum latitude/y coordinate
    /// * `max_x` - Maximum longitude/x coordinate
    /// * `max_y` - Maximum latitude/y coordinate
    ///
    /// # Examples
    ///
    /// ```
    /// use geoscan_types::bbox::BoundingBox2D;
    ///
    /// let bbox = BoundingBox2D::new(-74.0, 40.7, -73.9, 40.8);
    /// assert!(bbox.is_valid());
    /// ```
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate box covering a single point.
    pub const fn point(x: f32, y: f32) -> Self {
        Self::new(x, y, x, y)
    }

    /// The inverted box that encloses nothing.
    pub const fn empty() -> Self {
        Self::new(
            f32::INFINITY,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NEG_INFINITY,
        )
    }

    /// Approximate a double-precision rectangle, rounding outward so the
    /// result always encloses `rect`.
    pub fn from_rect(rect: &Rect<f64>) -> Self {
        Self::new(
            f64_to_f32_down(rect.min().x),
            f64_to_f32_down(rect.min().y),
            f64_to_f32_up(rect.max().x),
            f64_to_f32_up(rect.max().y),
        )
    }

    /// Approximate bounds of a geometry. Returns `None` for empty geometries.
    ///
    /// # Examples
    ///
    /// ```
    /// use geoscan_types::bbox::BoundingBox2D;
    /// use geo::{Geometry, MultiPoint, Point};
    ///
    /// let point = Geometry::Point(Point::new(1.0, 2.0));
    /// assert_eq!(
    ///     BoundingBox2D::from_geometry(&point),
    ///     Some(BoundingBox2D::point(1.0, 2.0))
    /// );
    ///
    /// let empty = Geometry::MultiPoint(MultiPoint::<f64>::new(vec![]));
    /// assert_eq!(BoundingBox2D::from_geometry(&empty), None);
    /// ```
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(|rect| Self::from_rect(&rect))
    }

    /// Whether this is the inverted [`BoundingBox2D::empty`] box (or any box
    /// with an inverted axis).
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Finite coordinates and `min <= max` on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Get the width of the bounding box.
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    /// Get the height of the bounding box.
    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// Get the center of the bounding box as `(x, y)`.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Check if a point is contained within this bounding box.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check if `other` lies entirely inside this bounding box.
    pub fn contains(&self, other: &BoundingBox2D) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Check if this bounding box intersects with another. Touching edges
    /// count as an intersection.
    pub fn intersects(&self, other: &BoundingBox2D) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// The smallest box enclosing both boxes.
    pub fn union(&self, other: &BoundingBox2D) -> Self {
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// The smallest box enclosing every box in `boxes`; the empty box when
    /// there are none.
    pub fn union_all<'a, I>(boxes: I) -> Self
    where
        I: IntoIterator<Item = &'a BoundingBox2D>,
    {
        boxes
            .into_iter()
            .fold(Self::empty(), |acc, bbox| acc.union(bbox))
    }

    /// Expand the bounding box by a given amount in all directions.
    pub fn expand(&self, amount: f32) -> Self {
        Self::new(
            self.min_x - amount,
            self.min_y - amount,
            self.max_x + amount,
            self.max_y + amount,
        )
    }
}

impl Default for BoundingBox2D {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Rect<f64>> for BoundingBox2D {
    fn from(rect: Rect<f64>) -> Self {
        Self::from_rect(&rect)
    }
}

impl std::fmt::Display for BoundingBox2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "BOX(EMPTY)");
        }
        write!(
            f,
            "BOX({} {}, {} {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Largest `f32` that is `<= value`.
fn f64_to_f32_down(value: f64) -> f32 {
    let narrowed = value as f32;
    if f64::from(narrowed) > value {
        narrowed.next_down()
    } else {
        narrowed
    }
}

/// Smallest `f32` that is `>= value`.
fn f64_to_f32_up(value: f64) -> f32 {
    let narrowed = value as f32;
    if f64::from(narrowed) < value {
        narrowed.next_up()
    } else {
        narrowed
    }
}
