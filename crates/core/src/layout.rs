use crate::models::Element;
use std::collections::BTreeMap;

pub const DEFAULT_SPLIT_X: f64 = 850.0;

/// Reorders elements into reading order for two-column pages.
///
/// Pages are emitted in ascending order (elements without a page count as page 0).
/// Within a page, elements whose top-left x is left of `split_x` are read first,
/// top to bottom, then the right column. Elements without coordinates follow both
/// columns in their original order.
pub fn split_and_sort_elements_by_page(elements: Vec<Element>, split_x: f64) -> Vec<Element> {
    let mut pages: BTreeMap<u32, Vec<Element>> = BTreeMap::new();
    for element in elements {
        pages
            .entry(element.page_number.unwrap_or(0))
            .or_default()
            .push(element);
    }

    let mut sorted = Vec::new();
    for (_page, page_elements) in pages {
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut unplaced = Vec::new();

        for element in page_elements {
            match element.origin() {
                Some((x, _)) if x < split_x => left.push(element),
                Some(_) => right.push(element),
                None => unplaced.push(element),
            }
        }

        left.sort_by(|a, b| top_y(a).total_cmp(&top_y(b)));
        right.sort_by(|a, b| top_y(a).total_cmp(&top_y(b)));

        sorted.extend(left);
        sorted.extend(right);
        sorted.extend(unplaced);
    }

    sorted
}

fn top_y(element: &Element) -> f64 {
    element.origin().map(|(_, y)| y).unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ElementCategory;

    fn element(id: &str, page: Option<u32>, origin: Option<(f64, f64)>) -> Element {
        Element {
            element_id: id.to_string(),
            category: ElementCategory::NarrativeText,
            text: id.to_string(),
            page_number: page,
            coordinates: origin.map(|point| vec![point]),
            text_as_html: None,
        }
    }

    fn ids(elements: &[Element]) -> Vec<&str> {
        elements.iter().map(|e| e.element_id.as_str()).collect()
    }

    #[test]
    fn left_column_is_read_before_right_column() {
        let elements = vec![
            element("right-top", Some(1), Some((900.0, 100.0))),
            element("left-bottom", Some(1), Some((100.0, 800.0))),
            element("left-top", Some(1), Some((100.0, 50.0))),
            element("right-bottom", Some(1), Some((1200.0, 700.0))),
        ];

        let sorted = split_and_sort_elements_by_page(elements, DEFAULT_SPLIT_X);

        assert_eq!(
            ids(&sorted),
            vec!["left-top", "left-bottom", "right-top", "right-bottom"]
        );
    }

    #[test]
    fn pages_are_emitted_in_ascending_order() {
        let elements = vec![
            element("p2", Some(2), Some((10.0, 10.0))),
            element("none", None, Some((10.0, 10.0))),
            element("p1", Some(1), Some((10.0, 10.0))),
        ];

        let sorted = split_and_sort_elements_by_page(elements, DEFAULT_SPLIT_X);

        assert_eq!(ids(&sorted), vec!["none", "p1", "p2"]);
    }

    #[test]
    fn elements_without_coordinates_are_kept_at_page_end() {
        let elements = vec![
            element("floating", Some(3), None),
            element("right", Some(3), Some((1000.0, 5.0))),
            element("left", Some(3), Some((5.0, 500.0))),
        ];

        let sorted = split_and_sort_elements_by_page(elements, DEFAULT_SPLIT_X);

        assert_eq!(ids(&sorted), vec!["left", "right", "floating"]);
    }

    #[test]
    fn equal_heights_keep_input_order() {
        let elements = vec![
            element("first", Some(1), Some((10.0, 10.0))),
            element("second", Some(1), Some((20.0, 10.0))),
        ];

        let sorted = split_and_sort_elements_by_page(elements, DEFAULT_SPLIT_X);

        assert_eq!(ids(&sorted), vec!["first", "second"]);
    }
}
