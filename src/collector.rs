use crate::model::RawRecord;

/// All raw records of a run, in page order then in-page order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<RawRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one page's records. A failed page simply contributes an empty vec.
    pub fn push_page(&mut self, records: Vec<RawRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for Dataset {
    type Item = RawRecord;
    type IntoIter = std::vec::IntoIter<RawRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<RawRecord> for Dataset {
    fn from_iter<I: IntoIterator<Item = RawRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Concatenates per-page record batches, keeping their order. No dedup, no validation.
pub fn collect<I>(pages: I) -> Dataset
where
    I: IntoIterator<Item = Vec<RawRecord>>,
{
    let mut dataset = Dataset::new();
    for page in pages {
        dataset.push_page(page);
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemOrigin;

    fn raw(page: u32, index: usize, title: &str) -> RawRecord {
        RawRecord {
            origin: ItemOrigin { page, index },
            title: Some(title.to_string()),
            price_text: "$1.00".to_string(),
            rating_text: "4.0 out of 5 stars".to_string(),
            reviews_text: "1".to_string(),
        }
    }

    #[test]
    fn keeps_page_then_item_order() {
        let dataset = collect(vec![
            vec![raw(1, 1, "a"), raw(1, 2, "b")],
            vec![],
            vec![raw(3, 1, "c")],
        ]);

        assert_eq!(dataset.len(), 3);
        let titles: Vec<_> = dataset.into_iter().map(|r| r.title.unwrap()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn does_not_deduplicate() {
        let dataset = collect(vec![vec![raw(1, 1, "same")], vec![raw(2, 1, "same")]]);
        assert_eq!(dataset.len(), 2);
    }

    #[test]
    fn no_pages_is_an_empty_dataset() {
        let dataset = collect(Vec::<Vec<RawRecord>>::new());
        assert!(dataset.is_empty());
    }
}
