use std::cmp::Ordering;

use crate::error::Result;

/// Hoare quicksort around the leftmost element. Recurses into the smaller partition and
/// loops on the larger, so stack depth stays logarithmic.
pub(crate) fn quicksort<T, F>(mut items: &mut [T], cmp: &mut F) -> Result<()>
where
    T: Clone,
    F: FnMut(&T, &T) -> Result<Ordering>,
{
    while items.len() > 1 {
        let split = partition(items, cmp)? + 1;
        if split >= items.len() {
            // only reachable with an inconsistent comparator
            return Ok(());
        }
        let (left, right) = std::mem::take(&mut items).split_at_mut(split);
        if left.len() < right.len() {
            quicksort(left, cmp)?;
            items = right;
        } else {
            quicksort(right, cmp)?;
            items = left;
        }
    }
    Ok(())
}

fn partition<T, F>(items: &mut [T], cmp: &mut F) -> Result<usize>
where
    T: Clone,
    F: FnMut(&T, &T) -> Result<Ordering>,
{
    let pivot = items[0].clone();
    let last = items.len() - 1;
    let mut i = 0;
    let mut j = last;
    loop {
        while i < last && cmp(&items[i], &pivot)? == Ordering::Less {
            i += 1;
        }
        while j > 0 && cmp(&items[j], &pivot)? == Ordering::Greater {
            j -= 1;
        }
        if i >= j {
            return Ok(j);
        }
        items.swap(i, j);
        i += 1;
        j -= 1;
    }
}
