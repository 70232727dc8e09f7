use crate::model::{RelationshipType, Surface};

/// Links every pair of surfaces that share a floor and a room.
///
/// Edges are added on both sides and deduplicated by area number, so running
/// this repeatedly over the same set yields the same edges. Returns the number
/// of new links created.
pub fn group_adjacent_surfaces(surfaces: &mut [Surface]) -> usize {
    let mut linked = 0;
    for i in 0..surfaces.len() {
        for j in (i + 1)..surfaces.len() {
            let (head, tail) = surfaces.split_at_mut(j);
            let (a, b) = (&mut head[i], &mut tail[0]);
            if a.location.floor != b.location.floor || a.location.room != b.location.room {
                continue;
            }
            let forward = a.add_adjacent_area(&b.area_number, RelationshipType::Adjacent);
            let backward = b.add_adjacent_area(&a.area_number, RelationshipType::Adjacent);
            if forward || backward {
                linked += 1;
            }
        }
    }
    linked
}
