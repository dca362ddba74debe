//! Prompt assembly for location generation.

use crate::coord::{Coordinate, WorldBounds};
use std::fmt::Write;

/// Build the user prompt for the cell at `coordinate`.
///
/// The output depends only on its inputs. Neighbor lines appear in the
/// order given.
pub fn build_prompt(
    coordinate: Coordinate,
    bounds: WorldBounds,
    context: &[(Coordinate, String)],
) -> String {
    let size = bounds.size();
    let mut prompt = format!(
        "You are a cyberpunk world generator. Create a vivid, immersive description for a \
         location at coordinates {coordinate} in a {size}x{size}x{size} cube world.

The description should be:
- You should never mention the coordinates in the description.
- Cyberpunk themed (neon lights, technology, urban decay, corporate control)
- 2-3 sentences long
- Atmospheric and immersive
- Unique to this specific location
- Include sensory details (sights, sounds, smells)
- Include details about the different directions that could be traveled to from this \
location (left, right, up, down, forward, backward each hint at the nearby cubes)

Location coordinates: {coordinate}"
    );

    if !context.is_empty() {
        prompt.push_str("\n\nSurrounding area context:\n");
        prompt.push_str(&format_context(context));
        prompt.push_str(
            "\n\nTreat each nearby description as a hint for the direction it lies in from \
             this location. Keep this location consistent with those hints.\
             \n\nDo not copy the nearby descriptions; describe what they look like from here.\
             \n\nStay unique to this specific location while fitting the surrounding area.",
        );
    }

    prompt.push_str("\n\nDescription:");
    prompt
}

/// Render neighbors as `- (x, y, z): description` lines.
pub fn format_context(context: &[(Coordinate, String)]) -> String {
    let mut out = String::new();
    for (i, (coordinate, description)) in context.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let description = if description.trim().is_empty() {
            "Unknown location"
        } else {
            description.as_str()
        };
        // Writing to a String cannot fail.
        let _ = write!(out, "- {coordinate}: {description}");
    }
    out
}
