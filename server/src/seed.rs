//! Demo data for local development.
//!
//! Seeds one dispatcher, two masters and five requests spread across the
//! lifecycle. Requests are created and moved through the
//! [`LifecycleEngine`] rather than inserted directly, so every seeded row
//! has a consistent assignee and a version matching its history.

use anyhow::Context;
use repair_desk_core::lifecycle::LifecycleEngine;
use repair_desk_core::types::{NewRequest, NewUser, Role, User};

/// Where a seeded request should end up.
#[derive(Clone, Copy, Debug)]
enum Stage {
    New,
    Assigned(usize),
    InProgress(usize),
    Done(usize),
}

/// Result of a [`seed_demo_data`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Users already existed; nothing written.
    Skipped,
    /// Demo data inserted.
    Seeded {
        /// Users created.
        users: usize,
        /// Requests created.
        requests: usize,
    },
}

fn demo_users() -> [NewUser; 3] {
    [
        NewUser::new("dispatcher", Role::Dispatcher, "Анна Петрова"),
        NewUser::new("master1", Role::Master, "Иван Сидоров"),
        NewUser::new("master2", Role::Master, "Дмитрий Козлов"),
    ]
}

fn demo_requests() -> [(NewRequest, Stage); 5] {
    [
        (
            NewRequest::new(
                "Сергей Иванов",
                "+7 (495) 123-45-67",
                "Москва, ул. Тверская, д. 15, кв. 42",
                "Течёт кран на кухне. Вода капает постоянно, нужен срочный ремонт.",
            ),
            Stage::New,
        ),
        (
            NewRequest::new(
                "Мария Кузнецова",
                "+7 (495) 987-65-43",
                "Москва, пр. Ленина, д. 28, кв. 7",
                "Перестала работать розетка в гостиной. Нет напряжения в двух розетках на южной стене.",
            ),
            Stage::Assigned(0),
        ),
        (
            NewRequest::new(
                "Алексей Попов",
                "+7 (495) 555-12-34",
                "Москва, ул. Арбат, д. 5, кв. 101",
                "Не работает батарея отопления в спальне. Температура в комнате опускается ниже 15 градусов ночью.",
            ),
            Stage::InProgress(1),
        ),
        (
            NewRequest::new(
                "Елена Соколова",
                "+7 (495) 333-44-55",
                "Москва, ул. Пушкина, д. 10, кв. 23",
                "Сломалась ручка окна в детской комнате. Невозможно нормально открыть или закрыть окно.",
            ),
            Stage::New,
        ),
        (
            NewRequest::new(
                "Виктор Орлов",
                "+7 (495) 777-88-99",
                "Москва, пр. Гагарина, д. 33, кв. 56",
                "Засорился слив в ванной. Вода не уходит совсем, возможен засор глубоко в трубах.",
            ),
            Stage::Done(0),
        ),
    ]
}

/// Insert demo data if the user table is empty.
///
/// # Errors
///
/// Returns an error if any store call or lifecycle operation fails. A
/// partially seeded database is left as is.
pub async fn seed_demo_data(engine: &LifecycleEngine) -> anyhow::Result<SeedOutcome> {
    let store = engine.store();
    if store.count_users().await.context("counting users")? > 0 {
        tracing::debug!("Users present, skipping demo seed");
        return Ok(SeedOutcome::Skipped);
    }

    let mut users: Vec<User> = Vec::new();
    for user in demo_users() {
        let username = user.username.clone();
        users.push(
            store
                .insert_user(user)
                .await
                .with_context(|| format!("inserting user {username}"))?,
        );
    }
    let dispatcher = users
        .iter()
        .find(|u| u.role == Role::Dispatcher)
        .context("demo dispatcher missing")?
        .as_actor();
    let masters: Vec<User> = users.iter().filter(|u| u.role == Role::Master).cloned().collect();

    let requests = demo_requests();
    let request_count = requests.len();
    for (input, stage) in requests {
        let created = engine
            .create_request(input)
            .await
            .context("creating demo request")?;

        let master = match stage {
            Stage::New => continue,
            Stage::Assigned(i) | Stage::InProgress(i) | Stage::Done(i) => masters
                .get(i)
                .with_context(|| format!("demo master {i} missing"))?
                .as_actor(),
        };

        engine
            .assign_request(&dispatcher, created.id, master.id)
            .await
            .context("assigning demo request")?;
        if matches!(stage, Stage::InProgress(_) | Stage::Done(_)) {
            engine
                .take_request(&master, created.id)
                .await
                .context("taking demo request")?;
        }
        if matches!(stage, Stage::Done(_)) {
            engine
                .complete_request(&master, created.id)
                .await
                .context("completing demo request")?;
        }
    }

    tracing::info!(users = users.len(), requests = request_count, "Demo data seeded");
    Ok(SeedOutcome::Seeded {
        users: users.len(),
        requests: request_count,
    })
}
