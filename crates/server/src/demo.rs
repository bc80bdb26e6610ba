//! Built-in demo script
//!
//! A small welcome script that touches every block family: greets joining
//! players, counts visits in a GLOBAL, and reacts to a custom doorbell event.

use housing_scripting::{params, BlockKind, CodeBlock, CodeLine, CodeScript, EventType};

pub fn welcome_script() -> CodeScript {
    let mut script = CodeScript::new("welcome");

    script.push_line(
        CodeLine::new(1, "helpers").with_block(
            CodeBlock::new(BlockKind::Function)
                .with_param(params::NAME, "reward")
                .with_body(vec![
                    CodeBlock::action(BlockKind::Item, "GIVE_TEMPLATE", "welcome_kit"),
                    CodeBlock::action(BlockKind::Message, "ACTION_BAR", "")
                        .with_param(params::VALUE, "&6+1 {gift}"),
                ]),
        ),
    );

    let mut greet = CodeLine::new(2, "greet")
        .with_block(
            CodeBlock::action(BlockKind::Item, "SAVE_TEMPLATE", "welcome_kit")
                .with_param("material", "cookie")
                .with_param("amount", 3.0)
                .with_param("displayName", "Housewarming Cookie"),
        )
        .with_block(CodeBlock::action(BlockKind::Variable, "INCREMENT", "global:visits"))
        .with_block(
            CodeBlock::action(BlockKind::Message, "TITLE", "")
                .with_param(params::VALUE, "&bWelcome!")
                .with_param("subtitle", "Visitor #{visits}"),
        )
        .with_block(
            CodeBlock::new(BlockKind::If)
                .with_param(params::CONDITION, "visits==1")
                .with_body(vec![CodeBlock::action(BlockKind::Command, "BROADCAST", "")
                    .with_param(params::VALUE, "&eThe house has its first visitor!")]),
        )
        .with_block(CodeBlock::new(BlockKind::Else).with_body(vec![
            CodeBlock::new(BlockKind::CallFunction)
                .with_param(params::FUNCTION, "reward")
                .with_param("arg.gift", "Housewarming Cookie"),
        ]));
    greet.set_trigger(Some(EventType::PlayerJoin));
    script.push_line(greet);

    let mut chat = CodeLine::new(3, "chat counter")
        .with_block(CodeBlock::action(BlockKind::Variable, "INCREMENT", "global:messages"))
        .with_block(
            CodeBlock::new(BlockKind::Repeat)
                .with_param(params::MAX_ITERATIONS, 3.0)
                .with_param(params::INDEX_VARIABLE, "i")
                .with_body(vec![CodeBlock::action(BlockKind::Variable, "PUSH", "echoes")
                    .with_param(params::VALUE, "echo")]),
        )
        .with_block(
            CodeBlock::action(BlockKind::Message, "SEND", "")
                .with_param(params::VALUE, "&7{echoes}")
                .with_param(params::NOTIFY, true)
                .with_param(params::SUCCESS_MESSAGE, "Message #{messages} logged"),
        );
    chat.set_trigger(Some(EventType::PlayerChat));
    script.push_line(chat);

    let mut doorbell = CodeLine::new(4, "doorbell")
        .with_block(
            CodeBlock::action(BlockKind::World, "PLAY_SOUND", "")
                .with_param(params::VALUE, "block.note_block.bell")
                .with_param("location", "world:0,64,0"),
        )
        .with_block(
            CodeBlock::action(BlockKind::World, "SET_WEATHER", "world")
                .with_param(params::VALUE, "thunder")
                .with_param(params::ERROR_HANDLING, "STOP"),
        )
        .with_block(
            CodeBlock::action(BlockKind::Command, "RUN", "")
                .with_param(params::VALUE, "say Ding dong ({system:weather})"),
        );
    doorbell.set_trigger(Some(EventType::Custom {
        name: "doorbell".into(),
    }));
    script.push_line(doorbell);

    script
}
