#![allow(dead_code)]

use restkit::{
    Entity, Error, ForeignKey, JoinKeys, RelationDescriptor, RequestContext, ResourceInput,
    ResourceOutput, ResourcePatch, Result,
};
use serde::{Deserialize, Serialize};

macro_rules! entity {
    ($ty:ty, $schema:literal) => {
        impl Entity for $ty {
            type Id = i64;
            const SCHEMA: &'static str = $schema;

            fn id(&self) -> Option<i64> {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = Some(id);
            }
        }
    };
}

// Stars and galaxies: a star names the galaxy it belongs to

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Star {
    pub id: Option<i64>,
    pub title: String,
    pub galaxy_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub id: Option<i64>,
    pub title: String,
}

entity!(Star, "stars");
entity!(Galaxy, "galaxies");

/// Galaxy (target) reached from a star (related) that points at it
pub fn galaxy_of_star() -> RelationDescriptor<Galaxy, Star> {
    RelationDescriptor::ChildOfParent(ForeignKey::new(
        "galaxy_id",
        |s: &Star| s.galaxy_id,
        |s: &mut Star, id: Option<i64>| s.galaxy_id = id,
    ))
}

/// Stars (target) of a galaxy (related)
pub fn stars_of_galaxy() -> RelationDescriptor<Star, Galaxy> {
    RelationDescriptor::ParentOfChild(ForeignKey::new(
        "galaxy_id",
        |s: &Star| s.galaxy_id,
        |s: &mut Star, id: Option<i64>| s.galaxy_id = id,
    ))
}

#[derive(Deserialize)]
pub struct TitleInput {
    pub title: String,
}

impl ResourceInput<Star> for TitleInput {
    fn apply(self, mut star: Star) -> Result<Star> {
        star.title = self.title;
        Ok(star)
    }
}

impl ResourceInput<Galaxy> for TitleInput {
    fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(Error::validation("title is required"));
        }
        Ok(())
    }

    fn apply(self, mut galaxy: Galaxy) -> Result<Galaxy> {
        galaxy.title = self.title;
        Ok(galaxy)
    }
}

#[derive(Deserialize)]
pub struct TitlePatch {
    pub title: Option<String>,
}

impl ResourcePatch<Galaxy> for TitlePatch {
    fn patch(self, mut galaxy: Galaxy) -> Result<Galaxy> {
        if let Some(title) = self.title {
            galaxy.title = title;
        }
        Ok(galaxy)
    }
}

impl ResourcePatch<Star> for TitlePatch {
    fn patch(self, mut star: Star) -> Result<Star> {
        if let Some(title) = self.title {
            star.title = title;
        }
        Ok(star)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TitleOutput {
    pub id: i64,
    pub title: String,
}

impl ResourceOutput<Star> for TitleOutput {
    fn from_entity(star: Star, _ctx: &RequestContext) -> Result<Self> {
        Ok(TitleOutput {
            id: star.require_id()?,
            title: star.title,
        })
    }
}

impl ResourceOutput<Galaxy> for TitleOutput {
    fn from_entity(galaxy: Galaxy, _ctx: &RequestContext) -> Result<Self> {
        Ok(TitleOutput {
            id: galaxy.require_id()?,
            title: galaxy.title,
        })
    }
}

// Users and todos: a todo has one owner and any number of assignees

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Option<i64>,
    pub title: String,
    pub user_id: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Option<i64>,
    pub todo_id: Option<i64>,
    pub user_id: Option<i64>,
}

entity!(User, "users");
entity!(Todo, "todos");
entity!(Assignment, "assignments");

/// Todos owned by a user
pub fn owned_todos() -> RelationDescriptor<Todo, User> {
    RelationDescriptor::ParentOfChild(ForeignKey::new(
        "user_id",
        |t: &Todo| t.user_id,
        |t: &mut Todo, id: Option<i64>| t.user_id = id,
    ))
}

/// Todos a user is assigned to
pub fn assigned_todos() -> RelationDescriptor<Todo, User, Assignment> {
    RelationDescriptor::Siblings(JoinKeys::new(
        ForeignKey::new(
            "todo_id",
            |a: &Assignment| a.todo_id,
            |a: &mut Assignment, id: Option<i64>| a.todo_id = id,
        ),
        ForeignKey::new(
            "user_id",
            |a: &Assignment| a.user_id,
            |a: &mut Assignment, id: Option<i64>| a.user_id = id,
        ),
    ))
}

impl ResourceInput<Todo> for TitleInput {
    fn apply(self, mut todo: Todo) -> Result<Todo> {
        todo.title = self.title;
        Ok(todo)
    }
}

impl ResourceOutput<Todo> for TitleOutput {
    fn from_entity(todo: Todo, _ctx: &RequestContext) -> Result<Self> {
        Ok(TitleOutput {
            id: todo.require_id()?,
            title: todo.title,
        })
    }
}

pub fn user(name: &str) -> User {
    User {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn todo(title: &str, owner: &User) -> Todo {
    Todo {
        title: title.to_string(),
        user_id: owner.id,
        ..Default::default()
    }
}
