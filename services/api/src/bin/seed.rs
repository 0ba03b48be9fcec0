//! services/api/src/bin/seed.rs
//!
//! Populates a development database with an admin, a teacher, a few students
//! and a starter poem catalogue. Safe to run twice: existing accounts are
//! reused and poems are only added to an empty catalogue.

use api_lib::{adapters::DbAdapter, config::Config, error::ApiError, security::hash_password};
use reading_practice_core::domain::{
    Difficulty, Level, NewPoem, NewUser, PageRequest, PoemFilter, Role, User,
};
use reading_practice_core::ports::{DatabaseService, PortError};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct SeedUser {
    email: &'static str,
    password: &'static str,
    name: &'static str,
    role: Role,
    level: Level,
    class_id: Option<&'static str>,
}

const USERS: &[SeedUser] = &[
    SeedUser {
        email: "admin@reading-practice.local",
        password: "admin123",
        name: "Administrator",
        role: Role::Admin,
        level: Level::Advanced,
        class_id: None,
    },
    SeedUser {
        email: "teacher@reading-practice.local",
        password: "teacher123",
        name: "Marie Dubois",
        role: Role::Teacher,
        level: Level::Advanced,
        class_id: Some("CM2-A"),
    },
    SeedUser {
        email: "emma.martin@student.local",
        password: "student123",
        name: "Emma Martin",
        role: Role::Student,
        level: Level::Beginner,
        class_id: Some("CM2-A"),
    },
    SeedUser {
        email: "lucas.bernard@student.local",
        password: "student123",
        name: "Lucas Bernard",
        role: Role::Student,
        level: Level::Intermediate,
        class_id: Some("CM2-A"),
    },
    SeedUser {
        email: "sophie.martin@student.local",
        password: "student123",
        name: "Sophie Martin",
        role: Role::Student,
        level: Level::Advanced,
        class_id: Some("CM2-B"),
    },
];

struct SeedPoem {
    title: &'static str,
    author: &'static str,
    theme: &'static str,
    level: Level,
    difficulty: Difficulty,
    duration_minutes: u32,
    description: &'static str,
    tags: &'static [&'static str],
    content: &'static str,
}

const POEMS: &[SeedPoem] = &[
    SeedPoem {
        title: "The Enchanted Garden",
        author: "Henri Dubois",
        theme: "Nature",
        level: Level::Beginner,
        difficulty: Difficulty::Easy,
        duration_minutes: 2,
        description: "A secret garden where the flowers talk to the butterflies.",
        tags: &["nature", "magic", "garden"],
        content: "In a secret garden, hidden from view,\n\
                  Grow flowers of every deepening hue.\n\
                  The roses whisper to the bees,\n\
                  The old trees hum among the leaves.",
    },
    SeedPoem {
        title: "The Travelling Bird",
        author: "Pierre Martin",
        theme: "Adventure",
        level: Level::Intermediate,
        difficulty: Difficulty::Medium,
        duration_minutes: 4,
        description: "A curious bird crosses mountains and valleys.",
        tags: &["adventure", "freedom", "travel"],
        content: "High up in the azure sky,\n\
                  A bird flies on, both free and high.\n\
                  It crosses hills and valleys wide,\n\
                  With every dream tucked safe inside.\n\n\
                  Its song rings out through every season,\n\
                  It needs no map and needs no reason.",
    },
    SeedPoem {
        title: "My Best Friend",
        author: "Sophie Laurent",
        theme: "Friendship",
        level: Level::Beginner,
        difficulty: Difficulty::Easy,
        duration_minutes: 3,
        description: "Two inseparable friends share every secret.",
        tags: &["friendship", "sharing", "childhood"],
        content: "I have a friend who never leaves,\n\
                  Who cheers me up whenever I grieve.\n\
                  We share our secrets and our games,\n\
                  And years go by, we stay the same.",
    },
    SeedPoem {
        title: "The Cloud Castle",
        author: "Antoine Rousseau",
        theme: "Imagination",
        level: Level::Advanced,
        difficulty: Difficulty::Hard,
        duration_minutes: 6,
        description: "A mysterious castle floats above the mountains.",
        tags: &["imagination", "dream", "castle"],
        content: "Above the mountains, tall and proud,\n\
                  There floats a castle made of cloud.\n\
                  Its towers brush against the stars,\n\
                  Its walls shine out like silver bars.\n\n\
                  Inside this palace in the air\n\
                  Live wizard princes, kind and fair.\n\
                  They weave gold dreams the whole night through\n\
                  For sleeping children, me and you.",
    },
];

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    let db = DbAdapter::new(db_pool.clone());
    db.run_migrations().await?;

    let mut teacher: Option<User> = None;
    for seed in USERS {
        let user = ensure_user(&db, seed).await?;
        if user.role == Role::Teacher && teacher.is_none() {
            teacher = Some(user);
        }
    }
    let teacher = teacher
        .ok_or_else(|| ApiError::Internal("The seed data defines no teacher".to_string()))?;

    let existing = db
        .list_poems(&PoemFilter::default(), PageRequest::new(1, 1))
        .await?;
    if existing.total > 0 {
        warn!(poems = existing.total, "Catalogue already populated, skipping poems");
    } else {
        for seed in POEMS {
            let poem = db
                .create_poem(NewPoem {
                    title: seed.title.to_string(),
                    author: seed.author.to_string(),
                    content: seed.content.to_string(),
                    theme: seed.theme.to_string(),
                    level: seed.level,
                    difficulty: seed.difficulty,
                    duration_minutes: seed.duration_minutes,
                    description: Some(seed.description.to_string()),
                    tags: seed.tags.iter().map(|t| t.to_string()).collect(),
                    created_by: teacher.id,
                })
                .await?;
            info!(poem_id = %poem.id, title = %poem.title, "Poem created");
        }
    }

    db_pool.close().await;
    info!("Seeding complete");
    Ok(())
}

/// Creates the account, or returns the one already registered under its email.
async fn ensure_user(db: &DbAdapter, seed: &SeedUser) -> Result<User, ApiError> {
    let created = db
        .create_user(NewUser {
            email: seed.email.to_string(),
            hashed_password: hash_password(seed.password)?,
            name: seed.name.to_string(),
            role: seed.role,
            level: seed.level,
            class_id: seed.class_id.map(String::from),
        })
        .await;
    match created {
        Ok(user) => {
            info!(email = %user.email, role = %user.role, "User created");
            Ok(user)
        }
        Err(PortError::Conflict(_)) => {
            warn!(email = seed.email, "User already exists, reusing it");
            Ok(db.get_credentials_by_email(seed.email).await?.user)
        }
        Err(e) => Err(e.into()),
    }
}
