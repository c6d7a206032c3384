use std::collections::HashMap;
use crate::runtime::engine::ImageRecord;

/// Orders images so that every image comes before its parent.
///
/// Only parent links between members of `images` count. Each image is
/// ranked by the longest chain of descendants below it inside the set,
/// leaves first; ties keep their input order.
pub(crate) fn removal_order(images: Vec<ImageRecord>) -> Vec<ImageRecord> {
    let index: HashMap<&str, usize> = images
        .iter()
        .enumerate()
        .map(|(position, image)| (image.id.as_str(), position))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); images.len()];
    for (position, image) in images.iter().enumerate() {
        if let Some(parent) = image.parent_id.as_deref().and_then(|parent| index.get(parent)) {
            if *parent != position {
                children[*parent].push(position);
            }
        }
    }

    let mut heights: Vec<Option<usize>> = vec![None; images.len()];
    for position in 0..images.len() {
        height(position, &children, &mut heights, &mut Vec::new());
    }

    let mut ranked: Vec<(usize, ImageRecord)> = images
        .into_iter()
        .enumerate()
        .map(|(position, image)| (heights[position].unwrap_or(0), image))
        .collect();
    ranked.sort_by_key(|(height, _)| *height);

    ranked.into_iter().map(|(_, image)| image).collect()
}

fn height(position: usize, children: &[Vec<usize>], heights: &mut [Option<usize>], visiting: &mut Vec<usize>) -> usize {
    if let Some(known) = heights[position] {
        return known;
    }
    // parent links never loop, but a corrupt listing must not recurse forever
    if visiting.contains(&position) {
        return 0;
    }

    visiting.push(position);
    let below = children[position]
        .iter()
        .map(|child| height(*child, children, heights, visiting) + 1)
        .max()
        .unwrap_or(0);
    visiting.pop();

    heights[position] = Some(below);
    below
}
