use std::collections::BTreeMap;

use crate::message::Embedded;

/// Replace every `cid:<id>` in `html` with the matching image's `data:` URI.
///
/// Matching is literal and case-sensitive. Longer content-ids go first so an
/// id that is a prefix of another (`img1` and `img10`) never clobbers it.
pub fn rewrite(html: &str, images: &BTreeMap<String, Embedded>) -> String {
    let mut ordered: Vec<(&String, &Embedded)> = images.iter().collect();
    ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    ordered.into_iter().fold(html.to_string(), |html, (id, image)| {
        let reference = format!("cid:{id}");
        if html.contains(&reference) {
            html.replace(&reference, &image.data_uri())
        } else {
            html
        }
    })
}
