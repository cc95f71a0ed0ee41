pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY,
        filepath TEXT NOT NULL UNIQUE,
        rating TEXT,
        character_name TEXT
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS image_tags (
        image_id INTEGER NOT NULL,
        tag_id INTEGER NOT NULL,
        confidence REAL,
        FOREIGN KEY(image_id) REFERENCES images(id) ON DELETE CASCADE,
        FOREIGN KEY(tag_id) REFERENCES tags(id),
        PRIMARY KEY(image_id, tag_id)
    );

    CREATE INDEX IF NOT EXISTS idx_images_character ON images (character_name);
    CREATE INDEX IF NOT EXISTS idx_image_tags_tag ON image_tags (tag_id);
";

/// SQLite refuses statements with more host parameters than this.
pub const MAX_PARAMS: usize = 999;
