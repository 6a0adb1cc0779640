use geo::Rect;

/// Accumulates the bounding rectangle of a stream of geometries. The extent
/// is [`None`] until the first rectangle has been included.
///
/// # Examples
///
/// ```rust
/// use geo::{coord, Rect};
/// use tileindex_core::util::extent::Extent;
///
/// let mut extent: Option<Rect> = None;
/// extent.include(&Rect::new(
///     coord! { x: 0.0, y: 0.0 },
///     coord! { x: 90.0, y: 45.0 },
/// ));
/// extent.include(&Rect::new(
///     coord! { x: -180.0, y: 45.0 },
///     coord! { x: -90.0, y: 90.0 },
/// ));
///
/// let extent = extent.unwrap();
/// assert_eq!(extent.min().x, -180.0);
/// assert_eq!(extent.min().y, 0.0);
/// assert_eq!(extent.max().x, 90.0);
/// assert_eq!(extent.max().y, 90.0);
/// ```
pub trait Extent {
    /// Grows the extent so it covers the given rectangle
    fn include(&mut self, rect: &Rect);
}

impl Extent for Option<Rect> {
    fn include(&mut self, rect: &Rect) {
        match self {
            None => *self = Some(*rect),
            Some(current) => {
                let min = current.min();
                let max = current.max();
                current.set_min((min.x.min(rect.min().x), min.y.min(rect.min().y)));
                current.set_max((max.x.max(rect.max().x), max.y.max(rect.max().y)));
            }
        }
    }
}
