use crate::disparity::DisparityMap;

/// Invalidate 4-connected regions of at most `max_size` pixels. Neighbours
/// belong to one region when their disparities differ by at most
/// `max_diff`. Returns the number of pixels removed.
pub fn filter_speckles(map: &mut DisparityMap, max_size: usize, max_diff: f32) -> usize {
    let (w, h) = (map.width, map.height);
    if max_size == 0 || w == 0 || h == 0 {
        return 0;
    }

    let mut label = vec![0u32; w * h];
    let mut stack = Vec::new();
    let mut region = Vec::new();
    let mut next = 0u32;
    let mut removed = 0;

    for seed in 0..w * h {
        if label[seed] != 0 || map.data[seed].is_none() {
            continue;
        }
        next += 1;
        label[seed] = next;
        stack.push(seed);
        region.clear();

        while let Some(i) = stack.pop() {
            region.push(i);
            let Some(d) = map.data[i] else { continue };
            let (x, y) = (i % w, i / w);
            let mut visit = |j: usize| {
                if label[j] == 0 {
                    if let Some(dj) = map.data[j] {
                        if (dj - d).abs() <= max_diff {
                            label[j] = next;
                            stack.push(j);
                        }
                    }
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }

        if region.len() <= max_size {
            for &i in &region {
                map.data[i] = None;
            }
            removed += region.len();
        }
    }
    removed
}
