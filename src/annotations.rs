use std::collections::HashMap;

use kurbo::{Point, Rect};

use crate::transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Self = Self::rgb(255, 0, 0);
    /// Fixed selection highlight; never an annotation's own color.
    pub const HIGHLIGHT: Self = Self::rgb(255, 255, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn as_rgb(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

/// Closed set of shapes; the compositor and the save flow both match
/// exhaustively, so adding a variant is a compile-time todo list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Rectangle,
    Arrow,
    Text,
}

/// A user-drawn shape, anchored in document space of the page it was
/// created on. Storing document coordinates (never scaled screen ones)
/// is what keeps annotations stable across zoom changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub start: Point,
    pub end: Point,
    pub color: Color,
    pub text: Option<String>,
}

impl Annotation {
    /// Axis-aligned bounds from the two drag endpoints.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.start.x.min(self.end.x),
            self.start.y.min(self.end.y),
            self.start.x.max(self.end.x),
            self.start.y.max(self.end.y),
        )
    }
}

/// Index-based weak reference to one annotation. Deletions elsewhere
/// invalidate it through [`AnnotationStore::delete`] rather than
/// leaving a dangling index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub page: usize,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    pages: HashMap<usize, Vec<Annotation>>,
    selection: Option<Selection>,
}

impl AnnotationStore {
    pub fn add(&mut self, page: usize, annotation: Annotation) -> usize {
        let list = self.pages.entry(page).or_default();
        list.push(annotation);
        list.len() - 1
    }

    /// Annotations for `page` in z-order (insertion order).
    pub fn page(&self, page: usize) -> &[Annotation] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pages_with_annotations(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self
            .pages
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(page, _)| *page)
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Topmost annotation whose screen-space bounds contain `point`.
    /// Later insertions win ties, matching draw order.
    pub fn hit_test(
        &self,
        page: usize,
        screen_point: Point,
        bitmap: (u32, u32),
        display: (u32, u32),
    ) -> Option<usize> {
        let list = self.pages.get(&page)?;
        list.iter()
            .enumerate()
            .rev()
            .find(|(_, annotation)| {
                let bounds = annotation.bounds();
                let min = transform::document_to_screen(bounds.origin(), bitmap, display);
                let max = transform::document_to_screen(
                    Point::new(bounds.x1, bounds.y1),
                    bitmap,
                    display,
                );
                Rect::new(min.x, min.y, max.x, max.y).contains(screen_point)
            })
            .map(|(index, _)| index)
    }

    /// Removes the annotation and drops any selection pointing at or
    /// above the removed index on that page.
    pub fn delete(&mut self, page: usize, index: usize) -> Option<Annotation> {
        let list = self.pages.get_mut(&page)?;
        if index >= list.len() {
            return None;
        }
        let removed = list.remove(index);

        if let Some(selection) = self.selection
            && selection.page == page
            && selection.index >= index
        {
            self.selection = None;
        }
        Some(removed)
    }

    pub fn edit_text(&mut self, page: usize, index: usize, text: impl Into<String>) -> bool {
        match self.annotation_mut(page, index) {
            Some(annotation) => {
                annotation.text = Some(text.into());
                true
            }
            None => false,
        }
    }

    pub fn edit_color(&mut self, page: usize, index: usize, color: Color) -> bool {
        match self.annotation_mut(page, index) {
            Some(annotation) => {
                annotation.color = color;
                true
            }
            None => false,
        }
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn select(&mut self, page: usize, index: usize) -> bool {
        let valid = self
            .pages
            .get(&page)
            .is_some_and(|list| index < list.len());
        if valid {
            self.selection = Some(Selection { page, index });
        }
        valid
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Drops every annotation and the selection (document close/open).
    pub fn clear(&mut self) {
        self.pages.clear();
        self.selection = None;
    }

    fn annotation_mut(&mut self, page: usize, index: usize) -> Option<&mut Annotation> {
        self.pages.get_mut(&page)?.get_mut(index)
    }
}
